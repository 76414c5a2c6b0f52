//! Dual-tier auto-save.
//!
//! Every content change re-arms two independent trailing-edge timers:
//!
//! - **fast tier**: after a short quiet window the draft is written to the
//!   local cache. No network, so it completes almost immediately. Failures
//!   are logged and the status falls back to what it was before the attempt.
//! - **slow tier**: after a longer quiet window the draft is upserted to the
//!   remote store. Failures set [`SaveStatus::Error`] and keep the message;
//!   nothing retries until the next change or a manual save.
//!
//! Remote syncs for the draft are serialized through a gate, so a sync that
//! fires while an earlier one is still outstanding waits for it instead of
//! issuing a second concurrent call.
//!
//! After [`AutoSaveEngine::teardown`] (or drop) no timer fires, and results
//! of a sync that was already in flight are discarded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use outreach_common::AutoSaveConfig;
use outreach_common::perf::TimingGuard;
use outreach_common::telemetry::counter;
use tokio::sync::watch;

use crate::clock::{Clock, SystemClock};
use crate::content::{DraftContent, DraftKey, LocalDraftRecord, UpsertDraft};
use crate::debounce::Debouncer;
use crate::local::{self, LocalCacheStore};
use crate::remote::RemoteDraftStore;
use crate::status::{SaveState, SaveStatus};

/// Auto-save engine for one draft.
pub struct AutoSaveEngine<L, R> {
    shared: Arc<EngineShared<L, R>>,
    fast: Debouncer<DraftKey>,
    slow: Debouncer<DraftKey>,
}

struct EngineShared<L, R> {
    key: DraftKey,
    local: Arc<L>,
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    config: AutoSaveConfig,
    state: watch::Sender<SaveState>,
    latest: Mutex<Option<DraftContent>>,
    sync_gate: tokio::sync::Mutex<()>,
    torn_down: AtomicBool,
    /// Bumped on every content change.
    revision: AtomicU64,
    /// Highest revision the remote store has accepted.
    synced_revision: AtomicU64,
}

impl<L, R> AutoSaveEngine<L, R>
where
    L: LocalCacheStore,
    R: RemoteDraftStore,
{
    pub fn new(key: DraftKey, local: Arc<L>, remote: Arc<R>, config: AutoSaveConfig) -> Self {
        Self::with_clock(key, local, remote, config, Arc::new(SystemClock))
    }

    /// Create an engine stamping local records with `clock`.
    pub fn with_clock(
        key: DraftKey,
        local: Arc<L>,
        remote: Arc<R>,
        config: AutoSaveConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(SaveState::default());
        tracing::debug!(
            draft = %key,
            fast_delay_ms = config.fast_delay_ms,
            slow_delay_ms = config.slow_delay_ms,
            "auto-save engine attached"
        );
        Self {
            shared: Arc::new(EngineShared {
                key,
                local,
                remote,
                clock,
                config,
                state,
                latest: Mutex::new(None),
                sync_gate: tokio::sync::Mutex::new(()),
                torn_down: AtomicBool::new(false),
                revision: AtomicU64::new(0),
                synced_revision: AtomicU64::new(0),
            }),
            fast: Debouncer::new("fast"),
            slow: Debouncer::new("slow"),
        }
    }

    /// Feed the latest draft content. Call on every edit.
    ///
    /// Re-arms both tiers from now, even if `content` equals the previous value.
    pub fn on_content_change(&self, content: DraftContent) {
        let shared = &self.shared;
        if shared.is_torn_down() {
            tracing::debug!(draft = %shared.key, "ignoring content change after teardown");
            return;
        }

        let revision = shared.revision.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&shared.latest) = Some(content.clone());

        let fast_shared = Arc::clone(shared);
        let fast_content = content.clone();
        self.fast
            .schedule(shared.key.clone(), shared.config.fast_delay(), move || {
                async move { fast_shared.write_local(fast_content) }
            });

        let slow_shared = Arc::clone(shared);
        self.slow
            .schedule(shared.key.clone(), shared.config.slow_delay(), move || {
                async move { slow_shared.sync_remote(content, revision).await }
            });
    }

    /// Save right away: cancel both timers and run both tiers for the latest
    /// content, waiting for the remote sync to finish.
    ///
    /// Does nothing if no content has been received yet.
    pub async fn save_now(&self) -> SaveState {
        let shared = &self.shared;
        if shared.is_torn_down() {
            return self.state();
        }

        self.fast.cancel(&shared.key);
        self.slow.cancel(&shared.key);

        let Some(content) = lock(&shared.latest).clone() else {
            return self.state();
        };
        let revision = shared.revision.load(Ordering::SeqCst);

        tracing::debug!(draft = %shared.key, "manual save");
        shared.write_local(content.clone());
        shared.sync_remote(content, revision).await;
        self.state()
    }

    /// Cancel pending timers and stop reacting to changes. Idempotent.
    pub fn teardown(&self) {
        if self.shared.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let fast = self.fast.cancel_all();
        let slow = self.slow.cancel_all();
        tracing::debug!(
            draft = %self.shared.key,
            cancelled_fast = fast,
            cancelled_slow = slow,
            "auto-save engine torn down"
        );
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.is_torn_down()
    }

    pub fn key(&self) -> &DraftKey {
        &self.shared.key
    }

    pub fn state(&self) -> SaveState {
        self.shared.state.borrow().clone()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.shared.state.borrow().status
    }

    pub fn last_saved_at(&self) -> Option<i64> {
        self.shared.state.borrow().last_saved_at
    }

    pub fn error(&self) -> Option<String> {
        self.shared.state.borrow().error.clone()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SaveState> {
        self.shared.state.subscribe()
    }

    /// The most recent content passed to [`Self::on_content_change`].
    pub fn latest_content(&self) -> Option<DraftContent> {
        lock(&self.shared.latest).clone()
    }

    /// True if a change has arrived since the remote store last accepted a sync.
    pub fn has_unsynced_changes(&self) -> bool {
        self.shared.revision.load(Ordering::SeqCst)
            > self.shared.synced_revision.load(Ordering::SeqCst)
    }

    /// Whether either tier has a timer armed.
    pub fn has_pending_save(&self) -> bool {
        self.fast.is_pending(&self.shared.key) || self.slow.is_pending(&self.shared.key)
    }
}

impl<L, R> Drop for AutoSaveEngine<L, R> {
    fn drop(&mut self) {
        self.shared.torn_down.store(true, Ordering::SeqCst);
        // Debouncers abort their own timers when dropped.
    }
}

impl<L, R> EngineShared<L, R>
where
    L: LocalCacheStore,
    R: RemoteDraftStore,
{
    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: SaveStatus) {
        self.state.send_modify(|s| s.status = status);
    }

    fn write_local(&self, content: DraftContent) {
        if self.is_torn_down() {
            return;
        }

        let previous = self.state.borrow().status;
        self.set_status(SaveStatus::Saving);

        let timestamp = self.clock.now_millis();
        let record = LocalDraftRecord { content, timestamp };
        let timer =
            TimingGuard::with_histogram("local draft write", "outreach_draft_local_write_ms");

        match local::save_record(&*self.local, &self.key, &record) {
            Ok(()) => {
                counter!("outreach_draft_local_writes_total").increment(1);
                self.state.send_modify(|s| {
                    s.status = SaveStatus::Saved;
                    s.last_saved_at = Some(timestamp);
                });
                tracing::debug!(
                    draft = %self.key,
                    tier = "fast",
                    elapsed_ms = timer.elapsed_ms(),
                    "draft saved locally"
                );
            }
            Err(e) => {
                counter!("outreach_draft_local_write_failures_total").increment(1);
                // Leave the status alone if a sync finished meanwhile.
                self.state.send_if_modified(|s| {
                    if s.status == SaveStatus::Saving {
                        s.status = previous;
                        true
                    } else {
                        false
                    }
                });
                tracing::warn!(draft = %self.key, tier = "fast", "local draft write failed: {}", e);
            }
        }
    }

    async fn sync_remote(&self, content: DraftContent, revision: u64) {
        if self.is_torn_down() {
            return;
        }

        // Wait out any sync still in flight for this draft.
        let _gate = self.sync_gate.lock().await;
        if self.is_torn_down() {
            return;
        }

        self.set_status(SaveStatus::Syncing);
        let timer =
            TimingGuard::with_histogram("remote draft sync", "outreach_draft_remote_sync_ms");
        let result = self
            .remote
            .upsert_draft(UpsertDraft::new(self.key.contact_id.clone(), content))
            .await;

        if self.is_torn_down() {
            tracing::debug!(draft = %self.key, "discarding sync result after teardown");
            return;
        }

        match result {
            Ok(metadata) => {
                counter!("outreach_draft_remote_syncs_total").increment(1);
                self.synced_revision.fetch_max(revision, Ordering::SeqCst);
                self.state.send_modify(|s| {
                    s.status = SaveStatus::Synced;
                    s.last_synced_at = Some(metadata.updated_at);
                    s.error = None;
                });
                tracing::debug!(
                    draft = %self.key,
                    tier = "slow",
                    remote_id = %metadata.id,
                    version = ?metadata.version,
                    elapsed_ms = timer.elapsed_ms(),
                    "draft synced"
                );
            }
            Err(e) => {
                counter!("outreach_draft_remote_sync_failures_total").increment(1);
                let message = e.to_string();
                tracing::warn!(draft = %self.key, tier = "slow", "draft sync failed: {}", message);
                self.state.send_modify(|s| {
                    s.status = SaveStatus::Error;
                    s.error = Some(message);
                });
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
