//! Caching for scraped link lists, converted PDFs and session cookies.
//!
//! Every cache goes through the [`CacheStore`] interface. The only backend is
//! the in-process [`TtlCache`]; entries are logically evicted once their TTL has
//! elapsed and the oldest entry is dropped when a cache is full.
//!
//! Session cookies additionally survive restarts through a durable JSON file,
//! see [`SessionCookieStore`].

mod cookies;
mod ttl;

pub use cookies::SessionCookieStore;
pub use ttl::TtlCache;

use crate::models::{LinkRecord, LinksCacheKey};

/// TTL key/value store
pub trait CacheStore<K, V>: Send + Sync {
    /// Get a live entry; expired entries count as missing
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or replace an entry (last write wins)
    fn set(&self, key: K, value: V);

    /// Drop an entry
    fn remove(&self, key: &K);

    /// Number of stored entries, expired ones included until purged
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    fn clear(&self);
}

/// Scraped link lists keyed by query digest and portal result page
pub type LinkResultCache = TtlCache<LinksCacheKey, Vec<LinkRecord>>;

/// Viewer HTML keyed by PDF source URL
pub type PdfCache = TtlCache<String, String>;
