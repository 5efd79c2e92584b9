#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use rusqlite::params;
use tempfile::TempDir;
use tower::ServiceExt;

use yatube::auth::session;
use yatube::blog::posts;
use yatube::config::Config;
use yatube::db;
use yatube::routes;
use yatube::state::{AppState, DbPool};

/// 2x1 GIF.
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];

const BOUNDARY: &str = "yatube-test-boundary";

pub struct TestApp {
    pub state: AppState,
    pub pool: DbPool,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = Some(dir.path().join("test.db"));
        config.storage.path = Some(dir.path().join("media"));
        config.auth.bcrypt_cost = 4;
        tweak(&mut config);

        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        Self {
            state: AppState::new(pool.clone(), config),
            pool,
            _dir: dir,
        }
    }

    pub fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }

    pub fn user(&self, username: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (username, first_name, last_name) VALUES (?1, 'Test', 'User')",
            params![username],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    /// Session cookie header value for a user.
    pub fn login(&self, user_id: i64) -> String {
        let conn = self.pool.get().unwrap();
        let token = session::create_session(&conn, user_id, 1).unwrap();
        format!("{}={}", self.state.config.auth.cookie_name, token)
    }

    pub fn group(&self, title: &str, slug: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        posts::create_group(&conn, title, slug, "").unwrap().id
    }

    pub fn post(&self, author: i64, text: &str, group: Option<i64>) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO posts (text, author_id, group_id) VALUES (?1, ?2, ?3)",
            params![text, author, group],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn count(&self, sql: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    pub fn post_text(&self, id: i64) -> String {
        let conn = self.pool.get().unwrap();
        conn.query_row("SELECT text FROM posts WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .unwrap()
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// multipart/form-data request with text fields and an optional image.
pub fn post_multipart(
    uri: &str,
    cookie: Option<&str>,
    fields: &[(&str, &str)],
    image: Option<(&str, &[u8])>,
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, data)) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder().method("POST").uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

pub fn assert_redirect(response: &Response, to: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(response), to);
}

/// Number of post cards on a rendered listing page.
pub fn card_count(html: &str) -> usize {
    html.matches("<article>").count()
}
