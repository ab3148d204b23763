//! Time-boxed fragment storage.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::RecoveringLock;

const SOURCE: &str = "cache::store";
pub(crate) const METRIC_FRAGMENT_HIT: &str = "blogroll_fragment_cache_hit_total";
pub(crate) const METRIC_FRAGMENT_MISS: &str = "blogroll_fragment_cache_miss_total";
pub(crate) const METRIC_FRAGMENT_STORE: &str = "blogroll_fragment_cache_store_total";

#[derive(Debug, Clone)]
struct Entry {
    html: Arc<str>,
    expires_at: Instant,
}

/// LRU of rendered fragments, each valid until its own deadline.
///
/// Concurrent misses may render the same fragment twice; the later store wins.
pub struct FragmentCache {
    config: CacheConfig,
    entries: RecoveringLock<LruCache<String, Entry>>,
}

impl FragmentCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = config.max_entries_non_zero();
        Self {
            config,
            entries: RecoveringLock::new(LruCache::new(capacity)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached fragment under `key`, if present and not yet expired.
    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        self.get_at(key, Instant::now())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&self, key: &str, html: Arc<str>, ttl: Duration) {
        self.set_at(key, html, ttl, Instant::now());
    }

    /// Return the fragment under `key`, rendering and storing it on a miss.
    ///
    /// Render failures are returned as-is and leave the cache untouched.
    pub async fn get_or_render<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        render: F,
    ) -> Result<Arc<str>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if !self.config.enabled {
            return render().await.map(Arc::from);
        }

        if let Some(html) = self.get(key) {
            counter!(METRIC_FRAGMENT_HIT).increment(1);
            return Ok(html);
        }
        counter!(METRIC_FRAGMENT_MISS).increment(1);

        let html: Arc<str> = Arc::from(render().await?);
        self.set(key, html.clone(), ttl);
        Ok(html)
    }

    pub fn clear(&self) {
        self.entries.write("clear").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Arc<str>> {
        let entries = self.entries.read("get");
        entries
            .peek(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.html.clone())
    }

    fn set_at(&self, key: &str, html: Arc<str>, ttl: Duration, now: Instant) {
        let mut entries = self.entries.write("set");
        let evicted = entries.push(
            key.to_string(),
            Entry {
                html,
                expires_at: now + ttl,
            },
        );
        counter!(METRIC_FRAGMENT_STORE).increment(1);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            debug!(
                target = SOURCE,
                evicted = %evicted_key,
                "fragment evicted for capacity"
            );
        }
    }
}
