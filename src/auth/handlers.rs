use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;

use crate::auth::{
    clear_session_cookie, get_cookie_value, safe_next, session, session_cookie,
};
use crate::blog::forms::{SignupForm, USERNAME_TAKEN};
use crate::blog::{users, FormErrors};
use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::routes::{Html, Nav};
use crate::state::AppState;

const BAD_CREDENTIALS: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

// -- Templates --

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub nav: Nav,
    pub form: SignupForm,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub nav: Nav,
    pub username: String,
    pub next: String,
    pub error: String,
}

impl LoginTemplate {
    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[derive(Template)]
#[template(path = "users/logged_out.html")]
pub struct LoggedOutTemplate {
    pub nav: Nav,
}

// -- Request types --

#[derive(Deserialize, Default)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup/", get(signup_page).post(signup))
        .route("/auth/login/", get(login_page).post(login))
        .route("/auth/logout/", get(logout).post(logout))
}

/// 303 to `location` carrying a fresh session cookie.
fn start_session(state: &AppState, user_id: i64, location: &str) -> AppResult<Response> {
    let conn = state.db.get()?;
    let hours = state.config.auth.session_hours;
    let token = session::create_session(&conn, user_id, hours)?;
    let cookie = session_cookie(&state.config.auth.cookie_name, &token, hours);

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location.to_string()),
            (header::SET_COOKIE, cookie),
        ],
    )
        .into_response())
}

/// bcrypt work runs off the async workers.
async fn blocking<T, F>(task: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {}", e)))?
}

fn redirect_home() -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, "/")]).into_response()
}

// -- Signup --

/// GET /auth/signup/
pub async fn signup_page(MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return redirect_home();
    }
    Html(SignupTemplate {
        nav: Nav::anonymous(),
        form: SignupForm::default(),
        errors: FormErrors::default(),
    })
    .into_response()
}

/// POST /auth/signup/ creates the account and logs it in.
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let pool = state.db.clone();
    let cost = state.config.auth.bcrypt_cost;
    let outcome = blocking(move || {
        let conn = pool.get()?;
        let new_user = match form.validate(&conn)? {
            Ok(new_user) => new_user,
            Err(errors) => return Ok(Err((form, errors))),
        };
        match users::create_user(&conn, &new_user, cost)? {
            Some(user) => Ok(Ok(user)),
            None => {
                let mut errors = FormErrors::default();
                errors.add("username", USERNAME_TAKEN);
                Ok(Err((form, errors)))
            }
        }
    })
    .await?;

    let user = match outcome {
        Ok(user) => user,
        Err((form, errors)) => {
            let form = SignupForm {
                password1: String::new(),
                password2: String::new(),
                ..form
            };
            let page = SignupTemplate {
                nav: Nav::anonymous(),
                form,
                errors,
            };
            return Ok(Html(page).into_response());
        }
    };

    tracing::info!(user_id = user.id, username = %user.username, "User signed up");
    start_session(&state, user.id, "/")
}

// -- Login --

/// GET /auth/login/
pub async fn login_page(
    MaybeUser(user): MaybeUser,
    Query(query): Query<NextQuery>,
) -> Response {
    let next = safe_next(query.next.as_deref()).to_string();
    if user.is_some() {
        return (StatusCode::SEE_OTHER, [(header::LOCATION, next)]).into_response();
    }
    Html(LoginTemplate {
        nav: Nav::anonymous(),
        username: String::new(),
        next,
        error: String::new(),
    })
    .into_response()
}

/// POST /auth/login/
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let next = safe_next(Some(form.next.as_str())).to_string();
    let pool = state.db.clone();
    let username = form.username.trim().to_string();
    let password = form.password.clone();
    let user = blocking(move || {
        let conn = pool.get()?;
        users::verify_credentials(&conn, &username, &password)
    })
    .await?;

    match user {
        Some(user) => {
            tracing::info!(user_id = user.id, "User logged in");
            start_session(&state, user.id, &next)
        }
        None => {
            tracing::debug!(username = %form.username, "Login failed");
            let page = LoginTemplate {
                nav: Nav::anonymous(),
                username: form.username,
                next,
                error: BAD_CREDENTIALS.to_string(),
            };
            Ok(Html(page).into_response())
        }
    }
}

// -- Logout --

/// GET or POST /auth/logout/ drops the session and clears the cookie.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = get_cookie_value(&headers, cookie_name) {
        let conn = state.db.get()?;
        if let Err(e) = session::delete_session(&conn, token) {
            tracing::warn!("Failed to delete session: {}", e);
        }
    }

    let page = Html(LoggedOutTemplate {
        nav: Nav::anonymous(),
    });
    Ok((
        [(header::SET_COOKIE, clear_session_cookie(cookie_name))],
        page,
    )
        .into_response())
}
