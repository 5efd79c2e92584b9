use rusqlite::{ffi, params, Connection};

/// True when the error is the follows table rejecting a self-subscription or
/// a duplicate pair.
fn is_follow_constraint(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_CHECK
                || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Subscribe `follower` to `author`. Following yourself or re-following is a
/// no-op; the store's constraints decide and this returns whether a new edge
/// was created.
pub fn follow(conn: &Connection, follower: i64, author: i64) -> rusqlite::Result<bool> {
    match conn.execute(
        "INSERT INTO follows (user_id, author_id) VALUES (?1, ?2)",
        params![follower, author],
    ) {
        Ok(_) => {
            tracing::info!(follower, author, "Follow created");
            Ok(true)
        }
        Err(e) if is_follow_constraint(&e) => {
            tracing::debug!(follower, author, "Follow skipped: {}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Remove the edge if present. Unfollowing someone you don't follow is a
/// no-op that returns `false`.
pub fn unfollow(conn: &Connection, follower: i64, author: i64) -> rusqlite::Result<bool> {
    let removed = conn.execute(
        "DELETE FROM follows WHERE user_id = ?1 AND author_id = ?2",
        params![follower, author],
    )?;
    if removed > 0 {
        tracing::info!(follower, author, "Follow removed");
    }
    Ok(removed > 0)
}

pub fn is_following(conn: &Connection, follower: i64, author: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM follows WHERE user_id = ?1 AND author_id = ?2",
        params![follower, author],
        |row| row.get(0),
    )
}

pub fn follower_count(conn: &Connection, author: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE author_id = ?1",
        params![author],
        |row| row.get(0),
    )
}

pub fn following_count(conn: &Connection, user: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE user_id = ?1",
        params![user],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blog::testing::{count_rows, seed_user, test_conn};

    #[test]
    fn follow_creates_edge() {
        let (_pool, conn) = test_conn();
        let reader = seed_user(&conn, "reader");
        let author = seed_user(&conn, "author");

        assert!(follow(&conn, reader, author).unwrap());
        assert!(is_following(&conn, reader, author).unwrap());
        assert!(!is_following(&conn, author, reader).unwrap());
        assert_eq!(follower_count(&conn, author).unwrap(), 1);
        assert_eq!(following_count(&conn, reader).unwrap(), 1);
    }

    #[test]
    fn self_follow_is_a_silent_no_op() {
        let (_pool, conn) = test_conn();
        let user = seed_user(&conn, "narcissus");

        assert!(!follow(&conn, user, user).unwrap());
        assert_eq!(count_rows(&conn, "follows"), 0);
    }

    #[test]
    fn refollow_is_idempotent() {
        let (_pool, conn) = test_conn();
        let reader = seed_user(&conn, "reader");
        let author = seed_user(&conn, "author");

        assert!(follow(&conn, reader, author).unwrap());
        assert!(!follow(&conn, reader, author).unwrap());
        assert_eq!(count_rows(&conn, "follows"), 1);
    }

    #[test]
    fn follow_then_unfollow_restores_count() {
        let (_pool, conn) = test_conn();
        let reader = seed_user(&conn, "reader");
        let author = seed_user(&conn, "author");
        let other = seed_user(&conn, "other");
        follow(&conn, other, author).unwrap();
        let before = count_rows(&conn, "follows");

        follow(&conn, reader, author).unwrap();
        assert!(unfollow(&conn, reader, author).unwrap());
        assert_eq!(count_rows(&conn, "follows"), before);
    }

    #[test]
    fn unfollow_missing_edge_is_a_no_op() {
        let (_pool, conn) = test_conn();
        let reader = seed_user(&conn, "reader");
        let author = seed_user(&conn, "author");
        assert!(!unfollow(&conn, reader, author).unwrap());
    }

    #[test]
    fn following_unknown_user_is_an_error() {
        let (_pool, conn) = test_conn();
        let reader = seed_user(&conn, "reader");
        assert!(follow(&conn, reader, 9999).is_err());
    }
}
