//! Remote draft store contract.
//!
//! The remote store is the record of truth. Transport (GraphQL, REST, auth)
//! lives behind this trait; the engine only distinguishes success from failure.

mod memory;

pub use memory::MemoryDraftStore;

use std::future::Future;

use crate::content::{DraftRecordMetadata, RemoteDraftRecord, UpsertDraft};
use crate::error::DraftError;

/// Authoritative storage for drafts, one per `(user, contact)`.
///
/// Implementations are scoped to an authenticated user, so calls take only the
/// contact id.
pub trait RemoteDraftStore: Send + Sync + 'static {
    /// Create or replace the draft for `draft.contact_id`.
    fn upsert_draft(
        &self,
        draft: UpsertDraft,
    ) -> impl Future<Output = Result<DraftRecordMetadata, DraftError>> + Send;

    /// Fetch the current draft for `contact_id`, if one exists.
    fn get_draft_by_contact(
        &self,
        contact_id: &str,
    ) -> impl Future<Output = Result<Option<RemoteDraftRecord>, DraftError>> + Send;
}
