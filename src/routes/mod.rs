pub mod about;
pub mod media;
pub mod posts;

use askama::Template;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// Unreserved characters stay as-is in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn profile_url(username: &str) -> String {
    format!("/profile/{}/", utf8_percent_encode(username, PATH_SEGMENT))
}

pub fn post_url(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

/// Navigation bar state shared by every page.
#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub authenticated: bool,
    pub username: String,
}

impl Nav {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user: &CurrentUser) -> Self {
        Self {
            authenticated: true,
            username: user.username.clone(),
        }
    }

    pub fn from_optional(user: Option<&CurrentUser>) -> Self {
        user.map(Self::for_user).unwrap_or_default()
    }

    pub fn profile_url(&self) -> String {
        profile_url(&self.username)
    }
}

#[derive(Template)]
#[template(path = "core/404.html")]
pub struct NotFoundTemplate {
    pub nav: Nav,
}

async fn not_found(MaybeUser(user): MaybeUser) -> Response {
    let page = Html(NotFoundTemplate {
        nav: Nav::from_optional(user.as_ref()),
    });
    (StatusCode::NOT_FOUND, page).into_response()
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.storage.max_upload_bytes;

    Router::new()
        .merge(posts::router())
        .merge(about::router())
        .merge(auth::handlers::router())
        .route("/media/{*path}", get(media::serve))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
