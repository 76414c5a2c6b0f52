use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::LocalCacheStore;
use crate::error::DraftError;

/// In-process cache store backed by a `HashMap`.
///
/// Also the fake used in tests: reads and writes can be made to fail on
/// demand, and successful writes are counted.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail (or stop failing).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `get` fail (or stop failing).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalCacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>, DraftError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DraftError::CacheRead("injected read failure".into()));
        }
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DraftError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DraftError::CacheWrite("quota exceeded".into()));
        }
        self.entries().insert(key.to_owned(), value.to_owned());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), DraftError> {
        self.entries().remove(key);
        Ok(())
    }
}
