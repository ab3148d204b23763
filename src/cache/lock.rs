//! Poison-tolerant guard around the fragment map.

use std::sync::{LockResult, RwLock, RwLockReadGuard, RwLockWriteGuard};

use metrics::counter;
use tracing::warn;

pub(crate) const METRIC_LOCK_RECOVERED: &str = "blogroll_fragment_cache_lock_recovered_total";

/// A `RwLock` that hands out the guarded value even after a holder panicked.
pub(crate) struct RecoveringLock<T> {
    inner: RwLock<T>,
}

impl<T> RecoveringLock<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    pub(crate) fn read(&self, op: &'static str) -> RwLockReadGuard<'_, T> {
        recover(self.inner.read(), op, "read")
    }

    pub(crate) fn write(&self, op: &'static str) -> RwLockWriteGuard<'_, T> {
        recover(self.inner.write(), op, "write")
    }
}

fn recover<G>(result: LockResult<G>, op: &'static str, mode: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        counter!(METRIC_LOCK_RECOVERED, "op" => op).increment(1);
        warn!(
            target = "cache::lock",
            op,
            mode,
            "fragment cache lock was poisoned, continuing with its contents"
        );
        poisoned.into_inner()
    })
}
