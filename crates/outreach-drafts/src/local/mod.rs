//! Local cache persistence for in-progress drafts.
//!
//! The cache is a synchronous string key/value store scoped to the current
//! session. It's a convenience copy, not the record of truth: write failures
//! are logged and swallowed by the engine, and anything that fails to decode
//! is treated as if it weren't there.

mod file;
mod memory;
#[cfg(feature = "ttl-cache")]
mod ttl;

pub use file::{FileCacheStore, encode_file_name};
pub use memory::MemoryCacheStore;
#[cfg(feature = "ttl-cache")]
pub use ttl::TtlCacheStore;

use serde::Deserialize;

use crate::content::{DraftContent, DraftKey, LocalDraftRecord};
use crate::error::DraftError;

/// Session-scoped key/value store holding serialized [`LocalDraftRecord`]s.
pub trait LocalCacheStore: Send + Sync + 'static {
    /// Read the raw value under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, DraftError>;

    /// Write `value` under `key`, replacing anything already there.
    fn set(&self, key: &str, value: &str) -> Result<(), DraftError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), DraftError>;
}

/// Result of looking a draft up in the local cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalLookup {
    /// Nothing stored under the key.
    Absent,
    /// Something is stored but it can't be used.
    Malformed(String),
    /// A usable record.
    Found(LocalDraftRecord),
}

impl LocalLookup {
    /// The record, if usable.
    pub fn into_record(self) -> Option<LocalDraftRecord> {
        match self {
            LocalLookup::Found(record) => Some(record),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDraft {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body_html: String,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
}

/// Serialize a record into the cache's wire format.
pub fn encode_record(record: &LocalDraftRecord) -> Result<String, DraftError> {
    Ok(serde_json::to_string(record)?)
}

/// Decode a cached value. The error is a human-readable reason.
pub fn decode_record(raw: &str) -> Result<LocalDraftRecord, String> {
    let stored: StoredDraft =
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;

    let timestamp = match stored.timestamp {
        None | Some(serde_json::Value::Null) => return Err("missing timestamp".into()),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .ok_or_else(|| format!("timestamp {} out of range", n))?,
        Some(other) => return Err(format!("timestamp is not a number: {}", other)),
    };

    Ok(LocalDraftRecord {
        content: DraftContent {
            subject: stored.subject,
            body_html: stored.body_html,
        },
        timestamp,
    })
}

/// Write a draft to the local cache.
pub fn save_record<L>(store: &L, key: &DraftKey, record: &LocalDraftRecord) -> Result<(), DraftError>
where
    L: LocalCacheStore + ?Sized,
{
    let encoded = encode_record(record)?;
    store.set(&key.storage_key(), &encoded)
}

/// Read a draft from the local cache.
///
/// Read failures are reported as [`LocalLookup::Absent`] after logging; a
/// cache that can't be read has nothing to offer.
pub fn load_record<L>(store: &L, key: &DraftKey) -> LocalLookup
where
    L: LocalCacheStore + ?Sized,
{
    let raw = match store.get(&key.storage_key()) {
        Ok(Some(raw)) => raw,
        Ok(None) => return LocalLookup::Absent,
        Err(e) => {
            tracing::warn!(draft = %key, "failed to read local draft cache: {}", e);
            return LocalLookup::Absent;
        }
    };

    match decode_record(&raw) {
        Ok(record) => LocalLookup::Found(record),
        Err(reason) => {
            tracing::warn!(draft = %key, %reason, "ignoring malformed local draft");
            LocalLookup::Malformed(reason)
        }
    }
}

/// Delete a draft from the local cache.
pub fn delete_record<L>(store: &L, key: &DraftKey) -> Result<(), DraftError>
where
    L: LocalCacheStore + ?Sized,
{
    store.remove(&key.storage_key())
}
