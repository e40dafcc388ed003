//! Response body cache in front of the store.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use bytes::Bytes;

use crate::config::CacheConfig;

pub trait Cache: Send + Sync {
    /// Cached body, if present.
    fn get(&self, key: &str) -> Option<Bytes>;
    /// Store `value` under `key`; implementations may drop it.
    fn set(&self, key: &str, value: Bytes);
}

/// Least-recently-used cache bounded by entry count and per-item size.
pub struct LruCache {
    inner: Mutex<lru::LruCache<String, Bytes>>,
    max_item_bytes: usize,
}

impl LruCache {
    pub fn new(capacity: NonZeroUsize, max_item_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(lru::LruCache::new(capacity)),
            max_item_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for LruCache {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Bytes) {
        if value.len() > self.max_item_bytes {
            return;
        }
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(key.to_string(), value);
        }
    }
}

/// Cache that stores nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &str) -> Option<Bytes> {
        None
    }

    fn set(&self, _key: &str, _value: Bytes) {}
}

/// Build the cache described by `config`.
pub fn from_config(config: &CacheConfig) -> Box<dyn Cache> {
    match NonZeroUsize::new(config.capacity) {
        Some(capacity) if config.enabled => Box::new(LruCache::new(capacity, config.max_item_bytes)),
        _ => Box::new(NoCache),
    }
}

pub(crate) fn file_key(hash: &str) -> String {
    format!("file:{hash}")
}

pub(crate) fn distro_key(hash: &str) -> String {
    format!("distro:{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> LruCache {
        LruCache::new(NonZeroUsize::new(capacity).unwrap(), 16)
    }

    #[test]
    fn evicts_least_recently_used() {
        let c = cache(2);
        c.set("a", Bytes::from_static(b"1"));
        c.set("b", Bytes::from_static(b"2"));
        assert!(c.get("a").is_some());
        c.set("c", Bytes::from_static(b"3"));
        assert!(c.get("b").is_none());
        assert_eq!(c.get("a").unwrap(), Bytes::from_static(b"1"));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn oversized_items_are_skipped() {
        let c = cache(4);
        c.set("big", Bytes::from(vec![0u8; 17]));
        assert!(c.get("big").is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn disabled_config_yields_no_cache() {
        let disabled = from_config(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        disabled.set("k", Bytes::from_static(b"v"));
        assert!(disabled.get("k").is_none());

        let enabled = from_config(&CacheConfig::default());
        enabled.set("k", Bytes::from_static(b"v"));
        assert_eq!(enabled.get("k").unwrap(), Bytes::from_static(b"v"));
    }

    #[test]
    fn namespaces_do_not_collide() {
        assert_ne!(file_key("ab"), distro_key("ab"));
    }
}
