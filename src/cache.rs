use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::blog::feed::{FeedScope, Page, PostCard};

/// Short-lived in-memory store of rendered feed pages, keyed by scope and
/// page number. A zero TTL disables caching entirely.
///
/// Every `clear` bumps the generation. Readers note the generation when they
/// miss and hand it back to `insert`, so a page loaded before an
/// invalidation is never stored after it.
pub struct FeedCache {
    ttl: Duration,
    generation: u64,
    pages: HashMap<(FeedScope, u32), (Instant, Page<PostCard>)>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: 0,
            pages: HashMap::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&mut self, scope: FeedScope, page: u32) -> Option<Page<PostCard>> {
        if !self.is_enabled() {
            return None;
        }
        self.clear_stale();
        self.pages
            .get(&(scope, page))
            .map(|(_, cached)| cached.clone())
    }

    /// Store a page read while the cache was at `generation`. Returns false
    /// (and stores nothing) if the cache was cleared since.
    pub fn insert(
        &mut self,
        scope: FeedScope,
        page: u32,
        value: Page<PostCard>,
        generation: u64,
    ) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if generation != self.generation {
            tracing::debug!(page, "Dropping feed page read before invalidation");
            return false;
        }
        self.clear_stale();
        self.pages.insert((scope, page), (Instant::now(), value));
        true
    }

    pub fn clear(&mut self) {
        if !self.pages.is_empty() {
            tracing::debug!("Invalidating {} cached feed pages", self.pages.len());
        }
        self.generation = self.generation.wrapping_add(1);
        self.pages.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    fn clear_stale(&mut self) {
        let ttl = self.ttl;
        self.pages.retain(|_, (stored, _)| stored.elapsed() < ttl);
    }
}
