use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::config::OutOfRange;

/// Which posts a feed page is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedScope {
    All,
    Group(i64),
    Author(i64),
    /// Posts by every author the given user follows.
    Following(i64),
}

impl FeedScope {
    fn filter(&self) -> (&'static str, Option<i64>) {
        match *self {
            FeedScope::All => ("", None),
            FeedScope::Group(id) => ("WHERE p.group_id = ?", Some(id)),
            FeedScope::Author(id) => ("WHERE p.author_id = ?", Some(id)),
            FeedScope::Following(user_id) => (
                "WHERE p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ?)",
                Some(user_id),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub page_size: u32,
    pub out_of_range: OutOfRange,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            out_of_range: OutOfRange::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLink {
    pub title: String,
    pub slug: String,
}

/// A post joined with everything a listing needs to render it.
#[derive(Debug, Clone)]
pub struct PostCard {
    pub id: i64,
    pub text: String,
    pub pub_date: String,
    pub author_username: String,
    pub author_name: String,
    pub group: Option<GroupLink>,
    pub image: Option<String>,
    pub comment_count: i64,
}

impl PostCard {
    pub fn url(&self) -> String {
        crate::routes::post_url(self.id)
    }

    pub fn author_url(&self) -> String {
        crate::routes::profile_url(&self.author_username)
    }

    pub fn has_group(&self) -> bool {
        self.group.is_some()
    }

    pub fn group_title(&self) -> &str {
        self.group.as_ref().map(|g| g.title.as_str()).unwrap_or("")
    }

    pub fn group_slug(&self) -> &str {
        self.group.as_ref().map(|g| g.slug.as_str()).unwrap_or("")
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn image_url(&self) -> String {
        self.image
            .as_deref()
            .map(|path| format!("/media/{}", path))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLink {
    pub number: u32,
    pub current: bool,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total: u64,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }

    pub fn next_page_number(&self) -> u32 {
        self.number + 1
    }

    /// From a page past the end, "previous" is the last real page.
    pub fn previous_page_number(&self) -> u32 {
        self.number.saturating_sub(1).clamp(1, self.num_pages)
    }

    /// Only served under the `empty` out-of-range policy.
    pub fn is_past_end(&self) -> bool {
        self.number > self.num_pages
    }

    pub fn links(&self) -> Vec<PageLink> {
        (1..=self.num_pages)
            .map(|number| PageLink {
                number,
                current: number == self.number,
            })
            .collect()
    }
}

/// Lenient page parameter: anything missing, non-numeric or below one is
/// the first page.
pub fn parse_page_number(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(1)
}

pub fn num_pages(total: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    total.div_ceil(size).max(1) as u32
}

/// Resolve the requested page against the total. `None` means "not found";
/// `Some((number, fetch))` tells the caller which page to report and whether
/// any rows should be loaded for it.
fn resolve_page(total: u64, requested: u32, settings: &FeedSettings) -> Option<(u32, bool)> {
    let last = num_pages(total, settings.page_size);
    if requested <= last {
        return Some((requested, true));
    }
    match settings.out_of_range {
        OutOfRange::NotFound => None,
        OutOfRange::Empty => Some((requested, false)),
        OutOfRange::Clamp => Some((last, true)),
    }
}

const POST_CARD_SELECT: &str = "SELECT p.id, p.text, p.pub_date, p.image,
        u.username, u.first_name, u.last_name, g.title, g.slug,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
     FROM posts p
     JOIN users u ON u.id = p.author_id
     LEFT JOIN post_groups g ON g.id = p.group_id";

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<PostCard> {
    let first_name: String = row.get(5)?;
    let last_name: String = row.get(6)?;
    let username: String = row.get(4)?;
    let full = format!("{} {}", first_name, last_name).trim().to_string();
    let group = match (row.get::<_, Option<String>>(7)?, row.get::<_, Option<String>>(8)?) {
        (Some(title), Some(slug)) => Some(GroupLink { title, slug }),
        _ => None,
    };
    let pub_date: String = row.get(2)?;

    Ok(PostCard {
        id: row.get(0)?,
        text: row.get(1)?,
        pub_date: parse_and_format_time(&pub_date),
        author_name: if full.is_empty() { username.clone() } else { full },
        author_username: username,
        group,
        image: row.get(3)?,
        comment_count: row.get(9)?,
    })
}

pub fn count_posts(conn: &Connection, scope: FeedScope) -> rusqlite::Result<u64> {
    let (filter, arg) = scope.filter();
    let sql = format!("SELECT COUNT(*) FROM posts p {}", filter);
    let total: i64 = conn.query_row(&sql, params_from_iter(arg), |row| row.get(0))?;
    Ok(total.max(0) as u64)
}

/// Load one page of a scope, newest first. Returns `None` when the page is
/// past the end and the policy is `NotFound`.
pub fn fetch_page(
    conn: &Connection,
    scope: FeedScope,
    requested: u32,
    settings: &FeedSettings,
) -> rusqlite::Result<Option<Page<PostCard>>> {
    let total = count_posts(conn, scope)?;
    let Some((number, fetch)) = resolve_page(total, requested.max(1), settings) else {
        return Ok(None);
    };

    let items = if fetch {
        let (filter, arg) = scope.filter();
        let sql = format!(
            "{} {} ORDER BY p.pub_date DESC, p.id DESC LIMIT ? OFFSET ?",
            POST_CARD_SELECT, filter
        );
        let limit = i64::from(settings.page_size);
        let offset = i64::from(number - 1) * limit;
        let args: Vec<i64> = arg.into_iter().chain([limit, offset]).collect();

        let mut stmt = conn.prepare(&sql)?;
        let cards = stmt
            .query_map(params_from_iter(args), card_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        cards
    } else {
        Vec::new()
    };

    Ok(Some(Page {
        items,
        number,
        num_pages: num_pages(total, settings.page_size),
        total,
        page_size: settings.page_size,
    }))
}

pub fn load_card(conn: &Connection, post_id: i64) -> rusqlite::Result<Option<PostCard>> {
    let sql = format!("{} WHERE p.id = ?1", POST_CARD_SELECT);
    conn.query_row(&sql, params![post_id], card_from_row)
        .optional()
}

// --- Time formatting ---

pub fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime) -> String {
    let now = Utc::now().naive_utc();
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%b %-d, %Y").to_string()
}
