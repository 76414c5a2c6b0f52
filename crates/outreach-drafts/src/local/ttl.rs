use std::time::Duration;

use outreach_common::CacheConfig;
use outreach_common::cache::{self, Cache};

use super::LocalCacheStore;
use crate::error::DraftError;

/// In-memory session cache whose entries lapse after a TTL.
///
/// Closest analogue to browser session storage: nothing survives the process,
/// and an abandoned draft eventually disappears on its own.
#[derive(Clone)]
pub struct TtlCacheStore {
    cache: Cache<String, String>,
}

impl TtlCacheStore {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            cache: cache::new_cache(max_entries, ttl),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl())
    }

    pub fn keys(&self) -> Vec<String> {
        cache::keys(&self.cache)
    }
}

impl std::fmt::Debug for TtlCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCacheStore").finish_non_exhaustive()
    }
}

impl LocalCacheStore for TtlCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, DraftError> {
        Ok(cache::get(&self.cache, &key.to_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DraftError> {
        cache::insert(&self.cache, key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), DraftError> {
        cache::remove(&self.cache, &key.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let store = TtlCacheStore::new(8, Duration::from_secs(60));
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_from_config() {
        let store = TtlCacheStore::from_config(&CacheConfig::default());
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
    }
}
