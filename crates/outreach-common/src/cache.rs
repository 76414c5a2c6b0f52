//! TTL cache helpers over mini-moka-wasm's thread-safe cache.
//!
//! Used for session-scoped stores where entries should lapse on their own
//! after a period of inactivity.

use std::hash::Hash;
use std::time::Duration;

pub type Cache<K, V> = mini_moka_wasm::sync::Cache<K, V>;

/// Create a new cache with the given capacity and TTL.
pub fn new_cache<K, V>(max_capacity: u64, ttl: Duration) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    mini_moka_wasm::sync::Cache::builder()
        .max_capacity(max_capacity)
        .time_to_live(ttl)
        .build()
}

pub fn get<K, V>(cache: &Cache<K, V>, key: &K) -> Option<V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache.get(key)
}

pub fn insert<K, V>(cache: &Cache<K, V>, key: K, value: V)
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache.insert(key, value);
}

pub fn remove<K, V>(cache: &Cache<K, V>, key: &K)
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache.invalidate(key);
}

/// Snapshot of all live keys.
pub fn keys<K, V>(cache: &Cache<K, V>) -> Vec<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache.iter().map(|entry| entry.key().clone()).collect()
}
