//! Draft auto-save and crash recovery for the outreach email composer.
//!
//! This crate provides:
//! - `Debouncer`: trailing-edge cancel-and-reschedule timers
//! - `AutoSaveEngine`: dual-tier persistence (fast local cache, slow remote sync)
//! - `RecoveryReconciler`: decides at mount whether to offer a cached draft
//! - `LocalCacheStore` / `RemoteDraftStore`: store traits plus in-memory,
//!   TTL and file-backed implementations
//! - `ComposerSession`: the mount/edit/unmount lifecycle tying them together

mod clock;
mod composer;
mod content;
mod debounce;
mod engine;
mod error;
mod recovery;
mod status;

pub mod local;
pub mod remote;

pub use clock::{Clock, ManualClock, SystemClock};
pub use composer::ComposerSession;
pub use content::{
    DRAFT_KEY_PREFIX, DraftContent, DraftKey, DraftRecordMetadata, LocalDraftRecord,
    RemoteDraftRecord, UpsertDraft,
};
pub use debounce::Debouncer;
pub use engine::AutoSaveEngine;
pub use error::DraftError;
pub use recovery::{
    Reconciliation, RecoveryDecision, RecoveryReconciler, RecoveryState, RecoverySession,
    RemoteLookup,
};
pub use status::{SaveState, SaveStatus};

pub use local::{FileCacheStore, LocalCacheStore, LocalLookup, MemoryCacheStore};
#[cfg(feature = "ttl-cache")]
pub use local::TtlCacheStore;
pub use remote::{MemoryDraftStore, RemoteDraftStore};

// Re-export config types consumers need to build an engine
pub use outreach_common::{AutoSaveConfig, CacheConfig};
