use std::time::Duration;

use tracing::debug;

use crate::listings::{Category, ListingsCache};

/// Decides whether the complement of a freshly loaded category should be warmed.
///
/// Only a complete miss qualifies: an existing entry, stale or fresh, is left alone.
#[derive(Clone)]
pub struct PrefetchScheduler {
    cache: ListingsCache,
    delay: Duration,
}

impl PrefetchScheduler {
    pub fn new(cache: ListingsCache, delay: Duration) -> Self {
        Self { cache, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn plan(&self, loaded: Category) -> Option<Category> {
        let other = loaded.complement();
        if self.cache.contains(&other) {
            debug!(%loaded, %other, "complement already cached; skipping prefetch");
            return None;
        }
        Some(other)
    }
}
