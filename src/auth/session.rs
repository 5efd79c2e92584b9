use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

/// Create a new session for a user. Returns the session token.
pub fn create_session(conn: &Connection, user_id: i64, hours: u64) -> rusqlite::Result<String> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// The (id, username) owning a live session token.
pub fn find_session_user(conn: &Connection, token: &str) -> rusqlite::Result<Option<(i64, String)>> {
    conn.query_row(
        "SELECT u.id, u.username FROM sessions s \
         JOIN users u ON u.id = s.user_id \
         WHERE s.token = ?1 AND s.expires_at > datetime('now')",
        params![token],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

/// Delete a session by token.
pub fn delete_session(conn: &Connection, token: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Drop every expired session; returns how many went.
pub fn purge_expired(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blog::testing::{seed_user, test_conn};

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn session_round_trip() {
        let (_pool, conn) = test_conn();
        let user = seed_user(&conn, "leo");
        let token = create_session(&conn, user, 1).unwrap();

        assert_eq!(
            find_session_user(&conn, &token).unwrap(),
            Some((user, "leo".to_string()))
        );

        delete_session(&conn, &token).unwrap();
        assert_eq!(find_session_user(&conn, &token).unwrap(), None);
    }

    #[test]
    fn expired_sessions_are_ignored_and_purged() {
        let (_pool, conn) = test_conn();
        let user = seed_user(&conn, "leo");
        let token = create_session(&conn, user, 1).unwrap();
        conn.execute(
            "UPDATE sessions SET expires_at = datetime('now', '-1 hours')",
            [],
        )
        .unwrap();

        assert_eq!(find_session_user(&conn, &token).unwrap(), None);
        assert_eq!(purge_expired(&conn).unwrap(), 1);
    }
}
