use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{Comment, Group, Post};

// --- Groups ---

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
    })
}

pub fn create_group(
    conn: &Connection,
    title: &str,
    slug: &str,
    description: &str,
) -> rusqlite::Result<Group> {
    conn.execute(
        "INSERT INTO post_groups (title, slug, description) VALUES (?1, ?2, ?3)",
        params![title, slug, description],
    )?;
    Ok(Group {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        slug: slug.to_string(),
        description: description.to_string(),
    })
}

pub fn find_group_by_slug(conn: &Connection, slug: &str) -> rusqlite::Result<Option<Group>> {
    conn.query_row(
        "SELECT id, title, slug, description FROM post_groups WHERE slug = ?1",
        params![slug],
        group_from_row,
    )
    .optional()
}

pub fn find_group(conn: &Connection, id: i64) -> rusqlite::Result<Option<Group>> {
    conn.query_row(
        "SELECT id, title, slug, description FROM post_groups WHERE id = ?1",
        params![id],
        group_from_row,
    )
    .optional()
}

pub fn list_groups(conn: &Connection) -> rusqlite::Result<Vec<Group>> {
    let mut stmt =
        conn.prepare("SELECT id, title, slug, description FROM post_groups ORDER BY title")?;
    let groups = stmt
        .query_map([], group_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(groups)
}

/// Delete a group. Its posts stay, with their group cleared.
pub fn delete_group(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let removed = conn.execute("DELETE FROM post_groups WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

// --- Posts ---

/// Validated post content ready to be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostInput {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        text: row.get(1)?,
        pub_date: row.get(2)?,
        author_id: row.get(3)?,
        group_id: row.get(4)?,
        image: row.get(5)?,
    })
}

pub fn create_post(conn: &Connection, author_id: i64, input: &PostInput) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO posts (text, author_id, group_id, image) VALUES (?1, ?2, ?3, ?4)",
        params![input.text, author_id, input.group_id, input.image],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_post(conn: &Connection, id: i64) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        "SELECT id, text, pub_date, author_id, group_id, image FROM posts WHERE id = ?1",
        params![id],
        post_from_row,
    )
    .optional()
}

/// Overwrite text and group. The image is only replaced when a new one was
/// uploaded; author and publication date never change.
pub fn update_post(conn: &Connection, id: i64, input: &PostInput) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE posts SET text = ?1, group_id = ?2, image = COALESCE(?3, image) WHERE id = ?4",
        params![input.text, input.group_id, input.image, id],
    )?;
    Ok(())
}

pub fn delete_post(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let removed = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

pub fn count_posts_by_author(conn: &Connection, author_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE author_id = ?1",
        params![author_id],
        |row| row.get(0),
    )
}

// --- Comments ---

pub struct CommentView {
    pub id: i64,
    pub author_username: String,
    pub text: String,
    pub created: String,
}

impl CommentView {
    pub fn author_url(&self) -> String {
        crate::routes::profile_url(&self.author_username)
    }
}

pub fn create_comment(
    conn: &Connection,
    post_id: i64,
    author_id: i64,
    text: &str,
) -> rusqlite::Result<Comment> {
    conn.execute(
        "INSERT INTO comments (post_id, author_id, text) VALUES (?1, ?2, ?3)",
        params![post_id, author_id, text],
    )?;
    let id = conn.last_insert_rowid();
    conn.query_row(
        "SELECT id, post_id, author_id, text, created FROM comments WHERE id = ?1",
        params![id],
        |row| {
            Ok(Comment {
                id: row.get(0)?,
                post_id: row.get(1)?,
                author_id: row.get(2)?,
                text: row.get(3)?,
                created: row.get(4)?,
            })
        },
    )
}

/// Comments on a post, oldest first.
pub fn list_comments(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<CommentView>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, u.username, c.text, c.created
         FROM comments c
         JOIN users u ON u.id = c.author_id
         WHERE c.post_id = ?1
         ORDER BY c.created ASC, c.id ASC",
    )?;

    let comments = stmt
        .query_map(params![post_id], |row| {
            let created: String = row.get(3)?;
            Ok(CommentView {
                id: row.get(0)?,
                author_username: row.get(1)?,
                text: row.get(2)?,
                created: crate::blog::feed::parse_and_format_time(&created),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(comments)
}
