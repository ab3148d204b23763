//! Rendered-fragment cache.
//!
//! Holds pieces of rendered HTML for a fixed wall-clock interval. Entries are
//! keyed by fragment name plus a digest of the values the fragment varies on,
//! and only ever leave the cache by expiring or by LRU eviction; writes to the
//! underlying data do not invalidate them.
//!
//! ```toml
//! [cache]
//! enabled = true
//! index_ttl_seconds = 20
//! max_entries = 64
//! ```

mod config;
mod keys;
mod lock;
mod store;

pub use config::CacheConfig;
pub use keys::{INDEX_PAGE_FRAGMENT, fragment_key};
pub use store::FragmentCache;
