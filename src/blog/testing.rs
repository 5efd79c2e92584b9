//! Fixtures shared by the unit tests of the blog modules.

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};

use crate::db;
use crate::state::DbPool;

pub fn test_conn() -> (DbPool, PooledConnection<SqliteConnectionManager>) {
    let pool = db::create_memory_pool().unwrap();
    db::run_migrations(&pool).unwrap();
    let conn = pool.get().unwrap();
    (pool, conn)
}

/// Insert a user without a password; returns the id.
pub fn seed_user(conn: &Connection, username: &str) -> i64 {
    conn.execute(
        "INSERT INTO users (username) VALUES (?1)",
        params![username],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn seed_post(conn: &Connection, author: i64, text: &str, group: Option<i64>) -> i64 {
    conn.execute(
        "INSERT INTO posts (text, author_id, group_id) VALUES (?1, ?2, ?3)",
        params![text, author, group],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .unwrap()
}
