use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::Mutex;

use crate::blog::feed::FeedSettings;
use crate::cache::FeedCache;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub feed_cache: Arc<Mutex<FeedCache>>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let ttl = Duration::from_secs(config.feed.index_cache_secs);
        Self {
            db,
            config,
            feed_cache: Arc::new(Mutex::new(FeedCache::new(ttl))),
        }
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            page_size: self.config.feed.page_size,
            out_of_range: self.config.feed.out_of_range,
        }
    }

    /// Drop every cached feed page after a post mutation.
    pub async fn invalidate_feeds(&self) {
        self.feed_cache.lock().await.clear();
    }
}
