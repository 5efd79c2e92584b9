use rusqlite::{ffi, params, Connection, OptionalExtension, Row};

use crate::db::models::User;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Insert a user with a bcrypt-hashed password. `None` when the username
/// is already taken.
pub fn create_user(conn: &Connection, new: &NewUser, cost: u32) -> AppResult<Option<User>> {
    let hash = bcrypt::hash(&new.password, cost)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    let inserted = conn.execute(
        "INSERT INTO users (username, first_name, last_name, email, password_hash)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![new.username, new.first_name, new.last_name, new.email, hash],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(username = %new.username, "Signup lost race for username");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    Ok(find_user(conn, id)?)
}

pub fn find_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        params![id],
        user_from_row,
    )
    .optional()
}

pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
        params![username],
        user_from_row,
    )
    .optional()
}

pub fn username_taken(conn: &Connection, username: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
}

/// Look up a user and check the password. `None` for unknown users, users
/// without a password and wrong passwords alike.
pub fn verify_credentials(
    conn: &Connection,
    username: &str,
    password: &str,
) -> AppResult<Option<User>> {
    let found: Option<(i64, Option<String>)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, Some(hash))) = found else {
        return Ok(None);
    };

    let valid = bcrypt::verify(password, &hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
    if !valid {
        return Ok(None);
    }

    Ok(find_user(conn, id)?)
}

/// Delete a user. Posts, comments, subscriptions and sessions go with them.
pub fn delete_user(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let removed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if removed > 0 {
        tracing::info!(user_id = id, "User deleted");
    }
    Ok(removed > 0)
}
