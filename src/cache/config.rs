//! Fragment cache configuration.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(20);
const DEFAULT_MAX_ENTRIES: usize = 64;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every lookup renders afresh and nothing is stored.
    pub enabled: bool,
    /// Lifetime of the cached global feed fragment.
    pub index_ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            index_ttl: DEFAULT_INDEX_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            index_ttl: settings.index_ttl,
            max_entries: settings.max_entries.get(),
        }
    }
}

impl CacheConfig {
    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
