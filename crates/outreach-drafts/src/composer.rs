//! One composer mount: recovery first, then auto-save.

use std::sync::Arc;

use outreach_common::AutoSaveConfig;
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::content::{DraftContent, DraftKey, RemoteDraftRecord};
use crate::engine::AutoSaveEngine;
use crate::error::DraftError;
use crate::local::LocalCacheStore;
use crate::recovery::{
    RecoveryDecision, RecoveryReconciler, RecoveryState, RecoverySession, RemoteLookup,
};
use crate::remote::RemoteDraftStore;
use crate::status::{SaveState, SaveStatus};

/// Everything a composer needs for one `(user, contact)` draft.
///
/// Mounting reconciles the local cache against the remote store before the
/// auto-save engine exists, so no save can race the recovery decision.
pub struct ComposerSession<L, R> {
    recovery: RecoverySession<L>,
    recovered: Option<DraftContent>,
    engine: AutoSaveEngine<L, R>,
}

impl<L, R> ComposerSession<L, R>
where
    L: LocalCacheStore,
    R: RemoteDraftStore,
{
    pub async fn mount(
        key: DraftKey,
        local: Arc<L>,
        remote: Arc<R>,
        config: AutoSaveConfig,
    ) -> Self {
        Self::mount_with_clock(key, local, remote, config, Arc::new(SystemClock)).await
    }

    pub async fn mount_with_clock(
        key: DraftKey,
        local: Arc<L>,
        remote: Arc<R>,
        config: AutoSaveConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut recovery = RecoverySession::pending(key.clone(), Arc::clone(&local));
        let reconciler = RecoveryReconciler::new(Arc::clone(&local), Arc::clone(&remote));
        let outcome = reconciler.reconcile_with_remote(&key).await;

        // Without a usable local record the reconciler never asked the remote
        // store, but the composer still wants its content to start from.
        let needs_fetch = outcome.remote == RemoteLookup::Skipped;
        recovery.apply(outcome);
        if needs_fetch {
            recovery.set_remote(fetch_remote(&*remote, &key).await);
        }

        tracing::info!(
            user_id = %key.user_id,
            contact_id = %key.contact_id,
            prompt = recovery.is_prompting(),
            has_remote = recovery.remote_record().is_some(),
            "composer mounted"
        );

        let engine = AutoSaveEngine::with_clock(key, local, remote, config, clock);
        Self {
            recovery,
            recovered: None,
            engine,
        }
    }

    pub fn key(&self) -> &DraftKey {
        self.engine.key()
    }

    pub fn decision(&self) -> &RecoveryDecision {
        self.recovery.decision()
    }

    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery.state()
    }

    pub fn is_prompting(&self) -> bool {
        self.recovery.is_prompting()
    }

    /// Accept the cached draft. See [`RecoverySession::recover`].
    pub fn recover(&mut self) -> Option<DraftContent> {
        let content = self.recovery.recover()?;
        self.recovered = Some(content.clone());
        Some(content)
    }

    /// Drop the cached draft. See [`RecoverySession::discard`].
    pub fn discard(&mut self) -> Result<Option<DraftContent>, DraftError> {
        self.recovery.discard()
    }

    /// What the remote store held at mount.
    pub fn remote_content(&self) -> Option<DraftContent> {
        self.recovery.remote_content()
    }

    /// Content the composer should display: the recovered draft if the user
    /// took it, otherwise the remote draft.
    pub fn initial_content(&self) -> Option<DraftContent> {
        self.recovered.clone().or_else(|| self.remote_content())
    }

    pub fn on_content_change(&self, content: DraftContent) {
        self.engine.on_content_change(content);
    }

    pub async fn save_now(&self) -> SaveState {
        self.engine.save_now().await
    }

    pub fn save_status(&self) -> SaveStatus {
        self.engine.save_status()
    }

    pub fn state(&self) -> SaveState {
        self.engine.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveState> {
        self.engine.subscribe()
    }

    pub fn has_unsynced_changes(&self) -> bool {
        self.engine.has_unsynced_changes()
    }

    pub fn engine(&self) -> &AutoSaveEngine<L, R> {
        &self.engine
    }

    /// Tear down the engine. Pending saves are dropped.
    pub fn unmount(self) {
        self.engine.teardown();
    }
}

async fn fetch_remote<R: RemoteDraftStore>(
    remote: &R,
    key: &DraftKey,
) -> Option<RemoteDraftRecord> {
    match remote.get_draft_by_contact(&key.contact_id).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(draft = %key, "failed to load remote draft: {}", e);
            None
        }
    }
}
