//! Save status reported to the composer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the draft currently stands. Owned by the engine; the UI only reads it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    /// Nothing has been saved this session
    #[default]
    Idle,
    /// Writing to the local cache
    Saving,
    /// Local cache holds the latest write
    Saved,
    /// Sending to the remote store
    Syncing,
    /// Remote store accepted the latest sync
    Synced,
    /// Last remote sync failed
    Error,
}

impl SaveStatus {
    /// True while a write or sync is underway.
    pub fn is_busy(self) -> bool {
        matches!(self, SaveStatus::Saving | SaveStatus::Syncing)
    }

    /// Short label for status indicators.
    pub fn label(self) -> &'static str {
        match self {
            SaveStatus::Idle => "",
            SaveStatus::Saving => "Saving...",
            SaveStatus::Saved => "Saved locally",
            SaveStatus::Syncing => "Syncing...",
            SaveStatus::Synced => "Saved",
            SaveStatus::Error => "Sync error",
        }
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveStatus::Idle => "idle",
            SaveStatus::Saving => "saving",
            SaveStatus::Saved => "saved",
            SaveStatus::Syncing => "syncing",
            SaveStatus::Synced => "synced",
            SaveStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of everything the composer displays about persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveState {
    pub status: SaveStatus,
    /// Epoch millis of the last successful local write.
    pub last_saved_at: Option<i64>,
    /// Remote `updatedAt` from the last successful sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Message from the last failed sync, cleared on the next success.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        let state = SaveState::default();
        assert_eq!(state.status, SaveStatus::Idle);
        assert!(state.last_saved_at.is_none());
        assert!(state.error.is_none());
    }

    #[test]
    fn test_busy_states() {
        assert!(SaveStatus::Saving.is_busy());
        assert!(SaveStatus::Syncing.is_busy());
        assert!(!SaveStatus::Saved.is_busy());
        assert!(!SaveStatus::Error.is_busy());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&SaveStatus::Synced).unwrap(),
            "\"synced\""
        );
        assert_eq!(SaveStatus::Syncing.to_string(), "syncing");
    }
}
