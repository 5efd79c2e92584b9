use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::{get_cookie_value, session};
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

async fn lookup_user(parts: &Parts, state: &AppState) -> Result<Option<CurrentUser>, AppError> {
    let Some(token) = get_cookie_value(&parts.headers, &state.config.auth.cookie_name) else {
        return Ok(None);
    };

    let conn = state.db.get()?;
    let found = session::find_session_user(&conn, token)?;
    Ok(found.map(|(id, username)| CurrentUser { id, username }))
}

/// Extractor that requires authentication.
/// Anonymous requests are sent to the login page with a `next` back to here.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match lookup_user(parts, state).await? {
            Some(user) => Ok(user),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_else(|| parts.uri.path().to_string());
                Err(AppError::LoginRequired(next))
            }
        }
    }
}

/// Optional user extractor — returns None instead of redirecting when not
/// authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(lookup_user(parts, state).await?))
    }
}
