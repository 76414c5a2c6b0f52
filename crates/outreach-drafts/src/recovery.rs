//! Crash recovery at composer mount.
//!
//! Before the auto-save engine attaches, the locally cached draft is compared
//! with the remote record. If the local copy is strictly newer (or there's no
//! remote copy to compare with) the user is offered to recover it.
//!
//! A remote fetch failure counts as "no remote draft". The local copy may be
//! the only one left, so the user gets the prompt and makes the call.

use std::sync::Arc;

use outreach_common::telemetry::counter;

use crate::content::{DraftContent, DraftKey, RemoteDraftRecord};
use crate::error::DraftError;
use crate::local::{self, LocalCacheStore, LocalLookup};
use crate::remote::RemoteDraftStore;

/// What the composer should do with a cached draft.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Nothing to offer; start from the remote draft (if any).
    None,
    /// A local draft is newer than anything the remote store has.
    PromptRecovery {
        content: DraftContent,
        /// Epoch millis of the cached write.
        timestamp: i64,
    },
}

impl RecoveryDecision {
    pub fn is_prompt(&self) -> bool {
        matches!(self, RecoveryDecision::PromptRecovery { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            RecoveryDecision::None => "none",
            RecoveryDecision::PromptRecovery { .. } => "prompt",
        }
    }
}

/// How the remote side looked during reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteLookup {
    /// No usable local record, so the remote store wasn't asked.
    Skipped,
    /// The remote store has no draft for this contact.
    Absent,
    /// The fetch failed. Treated as [`RemoteLookup::Absent`] for the decision.
    Unavailable(String),
    Found(RemoteDraftRecord),
}

impl RemoteLookup {
    pub fn record(&self) -> Option<&RemoteDraftRecord> {
        match self {
            RemoteLookup::Found(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<RemoteDraftRecord> {
        match self {
            RemoteLookup::Found(record) => Some(record),
            _ => None,
        }
    }
}

/// Full outcome of a reconciliation, decision plus what the remote held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    pub decision: RecoveryDecision,
    pub remote: RemoteLookup,
}

/// Compares the local cache against the remote store for one draft.
pub struct RecoveryReconciler<L, R> {
    local: Arc<L>,
    remote: Arc<R>,
}

impl<L, R> Clone for RecoveryReconciler<L, R> {
    fn clone(&self) -> Self {
        Self {
            local: Arc::clone(&self.local),
            remote: Arc::clone(&self.remote),
        }
    }
}

impl<L, R> RecoveryReconciler<L, R>
where
    L: LocalCacheStore,
    R: RemoteDraftStore,
{
    pub fn new(local: Arc<L>, remote: Arc<R>) -> Self {
        Self { local, remote }
    }

    /// Decide whether to offer recovery of the cached draft for `key`.
    ///
    /// Never fails: unreadable or malformed local data means [`RecoveryDecision::None`],
    /// and remote errors are treated as if the remote store had nothing.
    pub async fn reconcile(&self, key: &DraftKey) -> RecoveryDecision {
        self.reconcile_with_remote(key).await.decision
    }

    /// Like [`Self::reconcile`], also returning what the remote store held so
    /// callers don't need a second fetch.
    pub async fn reconcile_with_remote(&self, key: &DraftKey) -> Reconciliation {
        let outcome = self.run(key).await;
        counter!(
            "outreach_draft_recovery_decisions_total",
            "decision" => outcome.decision.label()
        )
        .increment(1);
        tracing::debug!(
            user_id = %key.user_id,
            contact_id = %key.contact_id,
            decision = outcome.decision.label(),
            "reconciled local draft"
        );
        outcome
    }

    async fn run(&self, key: &DraftKey) -> Reconciliation {
        let local = match local::load_record(&*self.local, key) {
            LocalLookup::Found(record) => record,
            LocalLookup::Absent | LocalLookup::Malformed(_) => {
                return Reconciliation {
                    decision: RecoveryDecision::None,
                    remote: RemoteLookup::Skipped,
                };
            }
        };

        let remote = match self.remote.get_draft_by_contact(&key.contact_id).await {
            Ok(Some(record)) => RemoteLookup::Found(record),
            Ok(None) => RemoteLookup::Absent,
            Err(e) => {
                tracing::warn!(
                    draft = %key,
                    "remote draft fetch failed during recovery, assuming none: {}",
                    e
                );
                RemoteLookup::Unavailable(e.to_string())
            }
        };

        let local_is_newer = match remote.record() {
            Some(record) => local.timestamp > record.updated_at_millis(),
            None => true,
        };

        let decision = if local_is_newer {
            RecoveryDecision::PromptRecovery {
                content: local.content,
                timestamp: local.timestamp,
            }
        } else {
            RecoveryDecision::None
        };

        Reconciliation { decision, remote }
    }
}

/// Where a mount's recovery flow stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryState {
    /// Reconciliation hasn't produced a decision yet.
    Pending,
    /// Nothing to recover.
    NoConflict,
    /// Waiting on the user to recover or discard.
    Prompting,
    Recovered,
    Discarded,
}

impl RecoveryState {
    /// True once nothing more can happen for this mount.
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            RecoveryState::NoConflict | RecoveryState::Recovered | RecoveryState::Discarded
        )
    }
}

/// The user's side of a recovery decision, for a single mount.
pub struct RecoverySession<L> {
    key: DraftKey,
    local: Arc<L>,
    decision: RecoveryDecision,
    remote: Option<RemoteDraftRecord>,
    state: RecoveryState,
}

impl<L: LocalCacheStore> RecoverySession<L> {
    /// A session whose reconciliation hasn't finished. Recover and discard
    /// are no-ops until [`apply`](Self::apply) is called.
    pub fn pending(key: DraftKey, local: Arc<L>) -> Self {
        Self {
            key,
            local,
            decision: RecoveryDecision::None,
            remote: None,
            state: RecoveryState::Pending,
        }
    }

    pub fn new(key: DraftKey, local: Arc<L>, outcome: Reconciliation) -> Self {
        let mut session = Self::pending(key, local);
        session.apply(outcome);
        session
    }

    /// Take the reconciler's result. Only the first call after
    /// [`pending`](Self::pending) has any effect.
    pub fn apply(&mut self, outcome: Reconciliation) {
        if self.state != RecoveryState::Pending {
            tracing::debug!(draft = %self.key, state = ?self.state, "reconciliation already applied");
            return;
        }
        self.state = if outcome.decision.is_prompt() {
            RecoveryState::Prompting
        } else {
            RecoveryState::NoConflict
        };
        self.decision = outcome.decision;
        self.remote = outcome.remote.into_record();
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn decision(&self) -> &RecoveryDecision {
        &self.decision
    }

    /// Whether the composer should be showing the recovery prompt.
    pub fn is_prompting(&self) -> bool {
        self.state == RecoveryState::Prompting
    }

    pub fn remote_record(&self) -> Option<&RemoteDraftRecord> {
        self.remote.as_ref()
    }

    /// Remote content to fall back on, if the remote store had a draft.
    pub fn remote_content(&self) -> Option<DraftContent> {
        self.remote.as_ref().map(RemoteDraftRecord::content)
    }

    pub(crate) fn set_remote(&mut self, remote: Option<RemoteDraftRecord>) {
        self.remote = remote;
    }

    /// Accept the cached draft.
    ///
    /// The cache entry is left in place, so reloading before the next save
    /// offers the same recovery again. Returns `None` unless prompting.
    pub fn recover(&mut self) -> Option<DraftContent> {
        let RecoveryDecision::PromptRecovery { content, .. } = &self.decision else {
            return None;
        };
        if self.state != RecoveryState::Prompting {
            tracing::debug!(draft = %self.key, state = ?self.state, "recover ignored");
            return None;
        }
        self.state = RecoveryState::Recovered;
        tracing::info!(draft = %self.key, "recovered local draft");
        Some(content.clone())
    }

    /// Throw the cached draft away and fall back to the remote copy.
    ///
    /// If deleting the cache entry fails the prompt stays up and the error is
    /// returned. Returns the remote content, if any.
    pub fn discard(&mut self) -> Result<Option<DraftContent>, DraftError> {
        if self.state != RecoveryState::Prompting {
            tracing::debug!(draft = %self.key, state = ?self.state, "discard ignored");
            return Ok(None);
        }
        local::delete_record(&*self.local, &self.key)?;
        self.state = RecoveryState::Discarded;
        tracing::info!(draft = %self.key, "discarded local draft");
        Ok(self.remote_content())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::LocalDraftRecord;
    use crate::local::MemoryCacheStore;
    use crate::remote::MemoryDraftStore;
    use chrono::DateTime;
    use smol_str::SmolStr;

    const T: i64 = 1_700_000_000_000;

    fn key() -> DraftKey {
        DraftKey::new("u1", "c1")
    }

    fn stores() -> (Arc<MemoryCacheStore>, Arc<MemoryDraftStore>) {
        (
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MemoryDraftStore::new("u1")),
        )
    }

    fn cache_local(local: &MemoryCacheStore, subject: &str, timestamp: i64) {
        let record = LocalDraftRecord {
            content: DraftContent::new(subject, "<p>local</p>"),
            timestamp,
        };
        local::save_record(local, &key(), &record).unwrap();
    }

    fn remote_at(remote: &MemoryDraftStore, subject: &str, updated_at: i64) {
        remote.insert_record(RemoteDraftRecord {
            id: SmolStr::new("r1"),
            user_id: "u1".into(),
            contact_id: "c1".into(),
            subject: subject.into(),
            body_html: "<p>remote</p>".into(),
            updated_at: DateTime::from_timestamp_millis(updated_at).unwrap(),
            version: Some(3),
        });
    }

    #[tokio::test]
    async fn test_no_local_record() {
        let (local, remote) = stores();
        remote_at(&remote, "Remote", T);
        let reconciler = RecoveryReconciler::new(local, remote.clone());

        let outcome = reconciler.reconcile_with_remote(&key()).await;
        assert_eq!(outcome.decision, RecoveryDecision::None);
        assert_eq!(outcome.remote, RemoteLookup::Skipped);
        assert_eq!(remote.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_local_newer_than_remote_prompts() {
        let (local, remote) = stores();
        cache_local(&local, "Local", T);
        remote_at(&remote, "Remote", T - 60_000);

        let decision = RecoveryReconciler::new(local, remote).reconcile(&key()).await;
        assert_eq!(
            decision,
            RecoveryDecision::PromptRecovery {
                content: DraftContent::new("Local", "<p>local</p>"),
                timestamp: T,
            }
        );
    }

    #[tokio::test]
    async fn test_remote_newer_is_none() {
        let (local, remote) = stores();
        cache_local(&local, "Local", T);
        remote_at(&remote, "Remote", T + 60_000);

        let outcome = RecoveryReconciler::new(local, remote)
            .reconcile_with_remote(&key())
            .await;
        assert_eq!(outcome.decision, RecoveryDecision::None);
        assert_eq!(outcome.remote.record().unwrap().subject, "Remote");
    }

    #[tokio::test]
    async fn test_equal_timestamps_prefer_remote() {
        let (local, remote) = stores();
        cache_local(&local, "Local", T);
        remote_at(&remote, "Remote", T);

        let decision = RecoveryReconciler::new(local, remote).reconcile(&key()).await;
        assert_eq!(decision, RecoveryDecision::None);
    }

    #[tokio::test]
    async fn test_no_remote_record_prompts() {
        let (local, remote) = stores();
        cache_local(&local, "Local", T);

        let outcome = RecoveryReconciler::new(local, remote)
            .reconcile_with_remote(&key())
            .await;
        assert!(outcome.decision.is_prompt());
        assert_eq!(outcome.remote, RemoteLookup::Absent);
    }

    #[tokio::test]
    async fn test_remote_fetch_failure_prompts() {
        let (local, remote) = stores();
        cache_local(&local, "Local", T);
        remote_at(&remote, "Remote", T + 60_000);
        remote.fail_fetches(true);

        let outcome = RecoveryReconciler::new(local, remote)
            .reconcile_with_remote(&key())
            .await;
        assert!(outcome.decision.is_prompt());
        assert!(matches!(outcome.remote, RemoteLookup::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_timestamp_is_none_regardless_of_remote() {
        for raw in [
            r#"{"subject":"Local","bodyHtml":""}"#,
            r#"{"subject":"Local","bodyHtml":"","timestamp":null}"#,
            r#"{"subject":"Local","bodyHtml":"","timestamp":"yesterday"}"#,
        ] {
            for remote_state in [None, Some(T - 60_000)] {
                let (local, remote) = stores();
                local.set(&key().storage_key(), raw).unwrap();
                if let Some(at) = remote_state {
                    remote_at(&remote, "Remote", at);
                }
                let decision = RecoveryReconciler::new(local, remote).reconcile(&key()).await;
                assert_eq!(decision, RecoveryDecision::None, "{raw}");
            }
        }
    }

    #[tokio::test]
    async fn test_corrupt_json_is_none() {
        let (local, remote) = stores();
        local.set(&key().storage_key(), "{\"subject\": \"Lo").unwrap();
        let decision = RecoveryReconciler::new(local, remote).reconcile(&key()).await;
        assert_eq!(decision, RecoveryDecision::None);
    }

    #[tokio::test]
    async fn test_recover_keeps_cache_entry() {
        let (local, remote) = stores();
        cache_local(&local, "Local", T);
        let reconciler = RecoveryReconciler::new(local.clone(), remote);

        let outcome = reconciler.reconcile_with_remote(&key()).await;
        let mut session = RecoverySession::new(key(), local.clone(), outcome);
        assert!(session.is_prompting());

        let content = session.recover().unwrap();
        assert_eq!(content.subject, "Local");
        assert_eq!(session.state(), RecoveryState::Recovered);
        assert!(local.contains(&key().storage_key()));

        // Resolved; further actions do nothing.
        assert!(session.recover().is_none());
        assert_eq!(session.discard().unwrap(), None);
        assert!(local.contains(&key().storage_key()));

        // A fresh mount offers the same recovery again.
        assert!(reconciler.reconcile(&key()).await.is_prompt());
    }

    #[tokio::test]
    async fn test_discard_removes_entry_and_falls_back_to_remote() {
        let (local, remote) = stores();
        cache_local(&local, "Local", T);
        remote_at(&remote, "Remote", T - 60_000);
        let reconciler = RecoveryReconciler::new(local.clone(), remote);

        let outcome = reconciler.reconcile_with_remote(&key()).await;
        let mut session = RecoverySession::new(key(), local.clone(), outcome);

        let fallback = session.discard().unwrap();
        assert_eq!(fallback.unwrap().subject, "Remote");
        assert_eq!(session.state(), RecoveryState::Discarded);
        assert!(!local.contains(&key().storage_key()));

        let again = reconciler.reconcile_with_remote(&key()).await;
        assert_eq!(again.decision, RecoveryDecision::None);
        assert_eq!(again.remote, RemoteLookup::Skipped);
    }

    #[tokio::test]
    async fn test_no_conflict_session_is_resolved() {
        let (local, remote) = stores();
        let outcome = RecoveryReconciler::new(local.clone(), remote)
            .reconcile_with_remote(&key())
            .await;
        let mut session = RecoverySession::new(key(), local, outcome);
        assert_eq!(session.state(), RecoveryState::NoConflict);
        assert!(session.state().is_resolved());
        assert!(session.recover().is_none());
    }

    #[tokio::test]
    async fn test_pending_session_waits_for_reconciliation() {
        let (local, remote) = stores();
        cache_local(&local, "Local", T);
        let mut session = RecoverySession::pending(key(), local.clone());
        assert_eq!(session.state(), RecoveryState::Pending);
        assert!(!session.state().is_resolved());

        // Nothing to act on before the decision arrives.
        assert!(session.recover().is_none());
        assert_eq!(session.discard().unwrap(), None);
        assert!(local.contains(&key().storage_key()));

        let reconciler = RecoveryReconciler::new(local.clone(), remote);
        session.apply(reconciler.reconcile_with_remote(&key()).await);
        assert!(session.is_prompting());

        // A late second result doesn't reopen or replace the decision.
        session.apply(Reconciliation {
            decision: RecoveryDecision::None,
            remote: RemoteLookup::Skipped,
        });
        assert!(session.is_prompting());
        assert_eq!(session.recover().unwrap().subject, "Local");
    }
}
