//! Draft values and the records they are persisted as.
//!
//! ## Local cache format
//!
//! Local records are stored under `email-draft-{userId}-{contactId}` as a flat
//! JSON object: `{"subject": ..., "bodyHtml": ..., "timestamp": <epoch ms>}`.
//!
//! ## Remote format
//!
//! The remote store owns one [`RemoteDraftRecord`] per `(userId, contactId)`.
//! Its `updatedAt` comes from the store's clock, never ours.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};

/// Prefix for all local draft cache keys.
pub const DRAFT_KEY_PREFIX: &str = "email-draft-";

/// Identifies one draft: the composing user and the contact it's addressed to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftKey {
    pub user_id: SmolStr,
    pub contact_id: SmolStr,
}

impl DraftKey {
    pub fn new(user_id: impl Into<SmolStr>, contact_id: impl Into<SmolStr>) -> Self {
        Self {
            user_id: user_id.into(),
            contact_id: contact_id.into(),
        }
    }

    /// Build the local cache key for this draft.
    pub fn storage_key(&self) -> SmolStr {
        format_smolstr!("{}{}-{}", DRAFT_KEY_PREFIX, self.user_id, self.contact_id)
    }

    /// Prefix shared by every local cache key belonging to `user_id`.
    pub fn user_prefix(user_id: &str) -> SmolStr {
        format_smolstr!("{}{}-", DRAFT_KEY_PREFIX, user_id)
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.contact_id)
    }
}

/// The unit of change tracked by the engine. Replaced wholesale on every edit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftContent {
    pub subject: String,
    pub body_html: String,
}

impl DraftContent {
    pub fn new(subject: impl Into<String>, body_html: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body_html: body_html.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_empty() && self.body_html.is_empty()
    }
}

/// A draft as cached locally by the fast tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalDraftRecord {
    #[serde(flatten)]
    pub content: DraftContent,
    /// Epoch milliseconds when the write happened.
    pub timestamp: i64,
}

/// Payload of a remote upsert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertDraft {
    pub contact_id: SmolStr,
    pub subject: String,
    pub body_html: String,
}

impl UpsertDraft {
    pub fn new(contact_id: impl Into<SmolStr>, content: DraftContent) -> Self {
        Self {
            contact_id: contact_id.into(),
            subject: content.subject,
            body_html: content.body_html,
        }
    }

    pub fn content(&self) -> DraftContent {
        DraftContent::new(self.subject.clone(), self.body_html.clone())
    }
}

/// What the remote store hands back after an upsert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecordMetadata {
    pub id: SmolStr,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// The authoritative draft held by the remote store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDraftRecord {
    pub id: SmolStr,
    pub user_id: SmolStr,
    pub contact_id: SmolStr,
    pub subject: String,
    pub body_html: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl RemoteDraftRecord {
    pub fn content(&self) -> DraftContent {
        DraftContent::new(self.subject.clone(), self.body_html.clone())
    }

    /// `updatedAt` normalized to epoch milliseconds for comparison with local records.
    pub fn updated_at_millis(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }

    pub fn metadata(&self) -> DraftRecordMetadata {
        DraftRecordMetadata {
            id: self.id.clone(),
            updated_at: self.updated_at,
            version: self.version,
        }
    }

    pub fn key(&self) -> DraftKey {
        DraftKey::new(self.user_id.clone(), self.contact_id.clone())
    }
}
