use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use smol_str::SmolStr;

use super::RemoteDraftStore;
use crate::clock::{Clock, SystemClock};
use crate::content::{DraftRecordMetadata, RemoteDraftRecord, UpsertDraft};
use crate::error::DraftError;

/// In-memory remote store for a single authenticated user.
///
/// Stamps `updatedAt` with its own clock, bumps `version` on every upsert,
/// and can simulate latency and failures. Tracks how many calls are in
/// flight at once so tests can check the engine never overlaps syncs.
pub struct MemoryDraftStore {
    user_id: SmolStr,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<SmolStr, RemoteDraftRecord>>,
    upserts: Mutex<Vec<UpsertDraft>>,
    latency: Mutex<Duration>,
    fail_upserts: AtomicBool,
    fail_fetches: AtomicBool,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryDraftStore {
    pub fn new(user_id: impl Into<SmolStr>) -> Self {
        Self::with_clock(user_id, Arc::new(SystemClock))
    }

    pub fn with_clock(user_id: impl Into<SmolStr>, clock: Arc<dyn Clock>) -> Self {
        Self {
            user_id: user_id.into(),
            clock,
            records: Mutex::new(HashMap::new()),
            upserts: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
            fail_upserts: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Seed or overwrite a record directly, bypassing the clock.
    pub fn insert_record(&self, record: RemoteDraftRecord) {
        lock(&self.records).insert(record.contact_id.clone(), record);
    }

    pub fn record(&self, contact_id: &str) -> Option<RemoteDraftRecord> {
        lock(&self.records).get(contact_id).cloned()
    }

    /// Every upsert payload received, including ones that were made to fail.
    pub fn upserts(&self) -> Vec<UpsertDraft> {
        lock(&self.upserts).clone()
    }

    pub fn upsert_count(&self) -> usize {
        lock(&self.upserts).len()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight simultaneously.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    async fn simulate_network(&self) -> InFlight<'_> {
        let guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            n0_future::time::sleep(latency).await;
        }
        guard
    }
}

impl RemoteDraftStore for MemoryDraftStore {
    async fn upsert_draft(&self, draft: UpsertDraft) -> Result<DraftRecordMetadata, DraftError> {
        let _in_flight = self.simulate_network().await;
        lock(&self.upserts).push(draft.clone());

        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(DraftError::Remote("service unavailable".into()));
        }

        let now = self.clock.now();
        let mut records = lock(&self.records);
        let record = records
            .entry(draft.contact_id.clone())
            .and_modify(|existing| {
                existing.subject = draft.subject.clone();
                existing.body_html = draft.body_html.clone();
                existing.updated_at = now;
                existing.version = Some(existing.version.unwrap_or(0) + 1);
            })
            .or_insert_with(|| RemoteDraftRecord {
                id: SmolStr::new(uuid::Uuid::now_v7().to_string()),
                user_id: self.user_id.clone(),
                contact_id: draft.contact_id.clone(),
                subject: draft.subject.clone(),
                body_html: draft.body_html.clone(),
                updated_at: now,
                version: Some(1),
            });
        Ok(record.metadata())
    }

    async fn get_draft_by_contact(
        &self,
        contact_id: &str,
    ) -> Result<Option<RemoteDraftRecord>, DraftError> {
        let _in_flight = self.simulate_network().await;
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(DraftError::Remote("network unreachable".into()));
        }
        Ok(lock(&self.records).get(contact_id).cloned())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
