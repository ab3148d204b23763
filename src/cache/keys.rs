//! Fragment cache keys.

use sha2::{Digest, Sha256};

/// Fragment name of the global feed listing on `/`.
pub const INDEX_PAGE_FRAGMENT: &str = "index_page";

/// Key for a named fragment: `template.cache.<name>.<sha256 of vary-on values>`.
///
/// Values are joined with `:` before hashing, so a fragment that varies on
/// nothing always maps to the same key.
pub fn fragment_key(name: &str, vary_on: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(vary_on.join(":").as_bytes());
    format!("template.cache.{name}.{}", hex::encode(hasher.finalize()))
}
