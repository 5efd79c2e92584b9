use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use rusqlite::Connection;
use serde::Deserialize;

use crate::blog::feed::{self, parse_page_number};
use crate::blog::forms::{CommentForm, PostForm};
use crate::blog::posts::{self, CommentView, PostInput};
use crate::blog::{follow, users, FeedScope, FormErrors, Page, PostCard};
use crate::db::models::{Group, Post};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::media::{self, ImageUpload};
use crate::routes::{post_url, profile_url, Html, Nav};
use crate::state::AppState;

const NOT_AUTHOR_NOTICE: &str = "Only the author can edit this post.";

// --- Templates ---

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub nav: Nav,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupListTemplate {
    pub nav: Nav,
    pub group: Group,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub nav: Nav,
    pub author_username: String,
    pub author_name: String,
    pub follow_url: String,
    pub unfollow_url: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub following: bool,
    pub can_follow: bool,
    pub page: Page<PostCard>,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub nav: Nav,
    pub post: PostCard,
    pub author_post_count: i64,
    pub comments: Vec<CommentView>,
    pub comment_text: String,
    pub errors: FormErrors,
    pub can_edit: bool,
}

pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct CreatePostTemplate {
    pub nav: Nav,
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub errors: FormErrors,
    pub notice: String,
}

#[derive(Template)]
#[template(path = "posts/follow.html")]
pub struct FollowTemplate {
    pub nav: Nav,
    pub page: Page<PostCard>,
}

// --- Queries ---

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    fn number(&self) -> u32 {
        parse_page_number(self.page.as_deref())
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/group/{slug}/", get(group_posts))
        .route("/profile/{username}/", get(profile))
        .route(
            "/profile/{username}/follow/",
            get(back_to_profile).post(profile_follow),
        )
        .route(
            "/profile/{username}/unfollow/",
            get(back_to_profile).post(profile_unfollow),
        )
        .route("/posts/{post_id}/", get(post_detail))
        .route("/posts/{post_id}/edit/", get(post_edit_page).post(post_edit))
        .route("/posts/{post_id}/delete/", post(post_delete))
        .route(
            "/posts/{post_id}/comment/",
            get(back_to_post).post(add_comment),
        )
        .route("/create/", get(post_create_page).post(post_create))
        .route("/follow/", get(follow_index))
}

// --- Helpers ---

/// Route ids that are not integers simply don't exist.
fn parse_post_id(raw: &str) -> AppResult<i64> {
    raw.parse::<i64>().map_err(|_| AppError::NotFound)
}

fn load_page(
    conn: &Connection,
    state: &AppState,
    scope: FeedScope,
    number: u32,
) -> AppResult<Page<PostCard>> {
    feed::fetch_page(conn, scope, number, &state.feed_settings())?.ok_or(AppError::NotFound)
}

/// Index pages are served from the feed cache while fresh. Pages past the
/// end are never cached.
async fn cached_index_page(state: &AppState, number: u32) -> AppResult<Page<PostCard>> {
    let generation = {
        let mut cache = state.feed_cache.lock().await;
        if let Some(page) = cache.get(FeedScope::All, number) {
            return Ok(page);
        }
        cache.generation()
    };

    let page = {
        let conn = state.db.get()?;
        load_page(&conn, state, FeedScope::All, number)?
    };
    if !page.is_past_end() {
        state
            .feed_cache
            .lock()
            .await
            .insert(FeedScope::All, number, page.clone(), generation);
    }
    Ok(page)
}

fn group_options(conn: &Connection, selected: Option<i64>) -> AppResult<Vec<GroupOption>> {
    Ok(posts::list_groups(conn)?
        .into_iter()
        .map(|g| GroupOption {
            selected: Some(g.id) == selected,
            id: g.id,
            title: g.title,
        })
        .collect())
}

async fn read_post_form(mut multipart: Multipart) -> AppResult<PostForm> {
    let mut form = PostForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => form.text = field.text().await?,
            "group" => form.group = field.text().await?,
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?.to_vec();
                form.image = Some(ImageUpload { file_name, data });
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Best-effort removal of a stored upload.
async fn discard_upload(state: &AppState, image: &str) {
    if let Some(path) = media::resolve_media_path(&state.config.uploads_path(), image) {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Run a post write that may reference a freshly saved upload. If the write
/// fails the upload is removed again.
async fn write_with_upload<T>(
    state: &AppState,
    image: Option<&str>,
    write: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> AppResult<T> {
    let result = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| write(&*conn).map_err(AppError::from));

    if result.is_err() {
        if let Some(image) = image {
            discard_upload(state, image).await;
        }
    }
    result
}

fn find_post_or_404(conn: &Connection, post_id: i64) -> AppResult<Post> {
    posts::find_post(conn, post_id)?.ok_or(AppError::NotFound)
}

fn render_detail(
    conn: &Connection,
    viewer: Option<&CurrentUser>,
    post_id: i64,
    comment_text: String,
    errors: FormErrors,
) -> AppResult<Html<PostDetailTemplate>> {
    let author_id = find_post_or_404(conn, post_id)?.author_id;
    let post = feed::load_card(conn, post_id)?.ok_or(AppError::NotFound)?;
    let author_post_count = posts::count_posts_by_author(conn, author_id)?;
    let comments = posts::list_comments(conn, post_id)?;
    let can_edit = viewer.is_some_and(|u| u.id == author_id);

    Ok(Html(PostDetailTemplate {
        nav: Nav::from_optional(viewer),
        post,
        author_post_count,
        comments,
        comment_text,
        errors,
        can_edit,
    }))
}

// --- Listing handlers ---

async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<IndexTemplate>> {
    let page = cached_index_page(&state, query.number()).await?;
    Ok(Html(IndexTemplate {
        nav: Nav::from_optional(user.as_ref()),
        page,
    }))
}

async fn group_posts(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<GroupListTemplate>> {
    let conn = state.db.get()?;
    let group = posts::find_group_by_slug(&conn, &slug)?.ok_or(AppError::NotFound)?;
    let page = load_page(&conn, &state, FeedScope::Group(group.id), query.number())?;

    Ok(Html(GroupListTemplate {
        nav: Nav::from_optional(user.as_ref()),
        group,
        page,
    }))
}

async fn profile(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<ProfileTemplate>> {
    let conn = state.db.get()?;
    let author = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
    let page = load_page(&conn, &state, FeedScope::Author(author.id), query.number())?;

    let following = match &user {
        Some(viewer) => follow::is_following(&conn, viewer.id, author.id)?,
        None => false,
    };
    let can_follow = user.as_ref().is_some_and(|viewer| viewer.id != author.id);
    let base = profile_url(&author.username);

    Ok(Html(ProfileTemplate {
        nav: Nav::from_optional(user.as_ref()),
        author_name: author.full_name(),
        follow_url: format!("{}follow/", base),
        unfollow_url: format!("{}unfollow/", base),
        follower_count: follow::follower_count(&conn, author.id)?,
        following_count: follow::following_count(&conn, author.id)?,
        author_username: author.username,
        following,
        can_follow,
        page,
    }))
}

async fn follow_index(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<FollowTemplate>> {
    let conn = state.db.get()?;
    let page = load_page(&conn, &state, FeedScope::Following(user.id), query.number())?;
    Ok(Html(FollowTemplate {
        nav: Nav::for_user(&user),
        page,
    }))
}

// --- Post handlers ---

async fn post_detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(post_id): Path<String>,
) -> AppResult<Html<PostDetailTemplate>> {
    let post_id = parse_post_id(&post_id)?;
    let conn = state.db.get()?;
    render_detail(&conn, user.as_ref(), post_id, String::new(), FormErrors::default())
}

async fn post_create_page(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Html<CreatePostTemplate>> {
    let conn = state.db.get()?;
    Ok(Html(CreatePostTemplate {
        nav: Nav::for_user(&user),
        is_edit: false,
        action: "/create/".to_string(),
        text: String::new(),
        groups: group_options(&conn, None)?,
        errors: FormErrors::default(),
        notice: String::new(),
    }))
}

async fn post_create(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = read_post_form(multipart).await?;
    let submitted = (form.text.clone(), form.group.trim().parse::<i64>().ok());

    let validated = {
        let conn = state.db.get()?;
        form.validate(&conn)?
    };

    let valid = match validated {
        Ok(valid) => valid,
        Err(errors) => {
            let conn = state.db.get()?;
            let page = CreatePostTemplate {
                nav: Nav::for_user(&user),
                is_edit: false,
                action: "/create/".to_string(),
                text: submitted.0,
                groups: group_options(&conn, submitted.1)?,
                errors,
                notice: String::new(),
            };
            return Ok(Html(page).into_response());
        }
    };

    let image = match &valid.image {
        Some(image) => Some(media::save_post_image(&state.config.uploads_path(), image).await?),
        None => None,
    };

    let input = PostInput {
        text: valid.text,
        group_id: valid.group_id,
        image,
    };
    let post_id = write_with_upload(&state, input.image.as_deref(), |conn| {
        posts::create_post(conn, user.id, &input)
    })
    .await?;
    state.invalidate_feeds().await;
    tracing::info!(post_id, author = %user.username, "Post created");

    Ok(Redirect::to(&profile_url(&user.username)).into_response())
}

async fn post_edit_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Html<CreatePostTemplate>> {
    let post_id = parse_post_id(&post_id)?;
    let conn = state.db.get()?;
    let post = find_post_or_404(&conn, post_id)?;
    let notice = if post.author_id == user.id {
        String::new()
    } else {
        NOT_AUTHOR_NOTICE.to_string()
    };

    Ok(Html(CreatePostTemplate {
        nav: Nav::for_user(&user),
        is_edit: true,
        action: format!("/posts/{}/edit/", post.id),
        groups: group_options(&conn, post.group_id)?,
        text: post.text,
        errors: FormErrors::default(),
        notice,
    }))
}

/// Authors get their changes saved; anyone else gets the stored post back in
/// the form with a notice and nothing is written.
async fn post_edit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    let post_id = parse_post_id(&post_id)?;
    let action = format!("/posts/{}/edit/", post_id);

    let existing = {
        let conn = state.db.get()?;
        find_post_or_404(&conn, post_id)?
    };

    if existing.author_id != user.id {
        tracing::warn!(post_id, user = %user.username, "Edit rejected: not the author");
        let conn = state.db.get()?;
        let page = CreatePostTemplate {
            nav: Nav::for_user(&user),
            is_edit: true,
            action,
            groups: group_options(&conn, existing.group_id)?,
            text: existing.text,
            errors: FormErrors::default(),
            notice: NOT_AUTHOR_NOTICE.to_string(),
        };
        return Ok(Html(page).into_response());
    }

    let form = read_post_form(multipart).await?;
    let submitted = (form.text.clone(), form.group.trim().parse::<i64>().ok());
    let validated = {
        let conn = state.db.get()?;
        form.validate(&conn)?
    };

    let valid = match validated {
        Ok(valid) => valid,
        Err(errors) => {
            let conn = state.db.get()?;
            let page = CreatePostTemplate {
                nav: Nav::for_user(&user),
                is_edit: true,
                action,
                text: submitted.0,
                groups: group_options(&conn, submitted.1)?,
                errors,
                notice: String::new(),
            };
            return Ok(Html(page).into_response());
        }
    };

    let image = match &valid.image {
        Some(image) => Some(media::save_post_image(&state.config.uploads_path(), image).await?),
        None => None,
    };

    let input = PostInput {
        text: valid.text,
        group_id: valid.group_id,
        image,
    };
    write_with_upload(&state, input.image.as_deref(), |conn| {
        posts::update_post(conn, post_id, &input)
    })
    .await?;
    state.invalidate_feeds().await;
    tracing::info!(post_id, "Post updated");

    Ok(Redirect::to(&post_url(post_id)).into_response())
}

async fn post_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Response> {
    let post_id = parse_post_id(&post_id)?;
    let post = {
        let conn = state.db.get()?;
        let post = find_post_or_404(&conn, post_id)?;
        if post.author_id != user.id {
            return Err(AppError::Forbidden);
        }
        posts::delete_post(&conn, post_id)?;
        post
    };
    state.invalidate_feeds().await;
    tracing::info!(post_id, excerpt = %post.excerpt(), "Post deleted");

    if let Some(image) = post.image.as_deref() {
        discard_upload(&state, image).await;
    }

    Ok(Redirect::to(&profile_url(&user.username)).into_response())
}

// --- Comments ---

/// GET on the comment endpoint never writes; it just goes back to the post.
async fn back_to_post(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(post_id): Path<String>,
) -> AppResult<Redirect> {
    let post_id = parse_post_id(&post_id)?;
    let conn = state.db.get()?;
    find_post_or_404(&conn, post_id)?;
    Ok(Redirect::to(&post_url(post_id)))
}

async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let post_id = parse_post_id(&post_id)?;
    let conn = state.db.get()?;
    find_post_or_404(&conn, post_id)?;

    match form.validate() {
        Ok(text) => {
            let comment = posts::create_comment(&conn, post_id, user.id, &text)?;
            tracing::info!(post_id, comment_id = comment.id, "Comment added");
            Ok(Redirect::to(&post_url(post_id)).into_response())
        }
        Err(errors) => {
            let page = render_detail(&conn, Some(&user), post_id, form.text, errors)?;
            Ok(page.into_response())
        }
    }
}

// --- Follows ---

/// GET on follow/unfollow never writes; it just goes back to the profile.
async fn back_to_profile(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let author = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
    Ok(Redirect::to(&profile_url(&author.username)))
}

async fn profile_follow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let author = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
    follow::follow(&conn, user.id, author.id)?;
    Ok(Redirect::to(&profile_url(&author.username)))
}

async fn profile_unfollow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let author = users::find_by_username(&conn, &username)?.ok_or(AppError::NotFound)?;
    follow::unfollow(&conn, user.id, author.id)?;
    Ok(Redirect::to(&profile_url(&author.username)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_ids_must_be_integers() {
        assert_eq!(parse_post_id("42").unwrap(), 42);
        assert!(matches!(parse_post_id("abc"), Err(AppError::NotFound)));
        assert!(matches!(parse_post_id(""), Err(AppError::NotFound)));
    }

    fn state_with_uploads(dir: &std::path::Path) -> AppState {
        let pool = crate::db::create_memory_pool().unwrap();
        crate::db::run_migrations(&pool).unwrap();
        let mut config = crate::config::Config::default();
        config.storage.path = Some(dir.to_path_buf());
        AppState::new(pool, config)
    }

    async fn saved_upload(state: &AppState) -> String {
        let image = media::inspect_image(ImageUpload {
            file_name: "small.gif".into(),
            data: media::fixtures::SMALL_GIF.to_vec(),
        })
        .unwrap();
        media::save_post_image(&state.config.uploads_path(), &image)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn failed_write_removes_saved_upload() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state_with_uploads(dir.path());
        let stored = saved_upload(&state).await;
        assert!(dir.path().join(&stored).exists());

        let result: AppResult<i64> = write_with_upload(&state, Some(&stored), |_| {
            Err(rusqlite::Error::QueryReturnedNoRows)
        })
        .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(!dir.path().join(&stored).exists());
    }

    #[tokio::test]
    async fn successful_write_keeps_upload() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state_with_uploads(dir.path());
        let stored = saved_upload(&state).await;

        let count = write_with_upload(&state, Some(&stored), |conn| {
            conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get::<_, i64>(0))
        })
        .await
        .unwrap();

        assert_eq!(count, 0);
        assert!(dir.path().join(&stored).exists());
    }

    #[test]
    fn page_query_defaults_to_first_page() {
        assert_eq!(PageQuery::default().number(), 1);
        let query = PageQuery {
            page: Some("3".into()),
        };
        assert_eq!(query.number(), 3);
    }
}
