//! Sync orchestration: bootstrap, incremental push, pull, cursors.
//!
//! A cycle runs init → (bootstrap)? → incremental push → pull → persist
//! state, always on the task queue so no two cycles overlap. Cursors only
//! advance after a successful push or pull; a crash mid-cycle is safe
//! because the overlap windows re-cover the unflushed tail and all writes
//! are idempotent.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent_mem_core::{
    observation_document, prompt_document, session_document, session_document_for_event,
    summary_document, MemoryDocument,
};
use agent_mem_storage::Storage;
use anyhow::Result;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::backend::SyncBackend;
use crate::queue::TaskQueue;
use crate::state::{SyncStateStore, TargetCursors};

/// Overlap subtracted from the local push cursor to tolerate clock jitter
/// and out-of-order epoch assignment.
pub const LOCAL_OVERLAP_MS: i64 = 5_000;
/// Overlap subtracted from the remote pull cursor.
pub const REMOTE_OVERLAP_MS: i64 = 5_000;
/// Default full-sync interval in milliseconds.
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;

/// Bidirectional synchronization engine.
///
/// Producers call the `schedule_*` entry points from any thread; all work
/// is serialized on the task queue. No sync error ever propagates to the
/// host: failed tasks are logged and retried by the next cycle.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    queue: TaskQueue,
    timer: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

struct EngineInner {
    storage: Storage,
    backend: Arc<dyn SyncBackend>,
    state: SyncStateStore,
    sync_interval: Duration,
    backend_ready: AtomicBool,
}

impl SyncEngine {
    /// Creates the engine. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        storage: Storage,
        backend: Arc<dyn SyncBackend>,
        state: SyncStateStore,
        sync_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                storage,
                backend,
                state,
                sync_interval,
                backend_ready: AtomicBool::new(false),
            }),
            queue: TaskQueue::new(),
            timer: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Backend name for logs.
    #[must_use]
    pub fn backend_label(&self) -> &str {
        self.inner.backend.label()
    }

    /// Enqueue the startup synchronization (with local bootstrap) and start
    /// the periodic full-sync timer.
    pub fn start(&self) {
        self.perform_synchronization("startup", true);

        let inner = Arc::clone(&self.inner);
        let queue = self.queue.clone();
        let period = self.inner.sync_interval;
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let inner = Arc::clone(&inner);
                queue.submit("interval-sync", async move {
                    inner.run_cycle("interval", false).await
                });
            }
        });
        *self.timer.lock() = Some(handle);
    }

    /// Enqueue a full synchronization cycle.
    pub fn perform_synchronization(&self, reason: &'static str, bootstrap_local: bool) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(reason, "sync engine closed, ignoring cycle request");
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.queue.submit("full-sync", async move { inner.run_cycle(reason, bootstrap_local).await });
    }

    /// Enqueue an incremental push of one user prompt (plus its session).
    pub fn schedule_user_prompt_sync(&self, prompt_id: &str) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let id = prompt_id.to_owned();
        self.queue.submit("prompt-sync", async move { inner.push_prompt(&id).await });
    }

    /// Enqueue an incremental push of one observation (plus its session).
    pub fn schedule_observation_sync(&self, observation_id: &str) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let id = observation_id.to_owned();
        self.queue.submit("observation-sync", async move { inner.push_observation(&id).await });
    }

    /// Enqueue an incremental push of one summary (plus its session).
    pub fn schedule_summary_sync(&self, summary_id: &str) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let id = summary_id.to_owned();
        self.queue.submit("summary-sync", async move { inner.push_summary(&id).await });
    }

    /// Resolve once all previously enqueued work has finished.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    /// Stop the timer, drain the queue, and close the backend.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        let inner = Arc::clone(&self.inner);
        self.queue.submit("close-backend", async move { inner.backend.close().await });
        self.queue.flush().await;
    }
}

impl EngineInner {
    async fn ensure_backend_ready(&self) -> Result<()> {
        if self.backend_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.initialize().await?;
        self.backend_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn cursors(&self) -> (BTreeMap<String, TargetCursors>, TargetCursors) {
        let targets = self.state.load();
        let cursors =
            targets.get(self.backend.target_fingerprint()).cloned().unwrap_or_default();
        (targets, cursors)
    }

    fn persist(
        &self,
        targets: &mut BTreeMap<String, TargetCursors>,
        cursors: &TargetCursors,
    ) -> Result<()> {
        targets.insert(self.backend.target_fingerprint().to_owned(), cursors.clone());
        self.state.save(targets)
    }

    async fn run_cycle(&self, reason: &'static str, bootstrap_local: bool) -> Result<()> {
        self.ensure_backend_ready().await?;
        let (mut targets, mut cursors) = self.cursors();
        let mut pushed = 0usize;

        if bootstrap_local && !cursors.bootstrap_complete {
            let docs = self.collect_all_documents()?;
            if !docs.is_empty() {
                self.backend.upsert_documents(&docs).await?;
            }
            cursors.bootstrap_complete = true;
            cursors.last_local_push_epoch =
                cursors.last_local_push_epoch.max(max_updated_epoch(&docs));
            self.persist(&mut targets, &cursors)?;
            pushed += docs.len();
            tracing::info!(
                backend = self.backend.label(),
                documents = docs.len(),
                "bootstrap push complete"
            );
        }

        let since = (cursors.last_local_push_epoch - LOCAL_OVERLAP_MS).max(0);
        let docs = self.collect_documents_since(since)?;
        if !docs.is_empty() {
            self.backend.upsert_documents(&docs).await?;
            cursors.last_local_push_epoch =
                cursors.last_local_push_epoch.max(max_updated_epoch(&docs));
            self.persist(&mut targets, &cursors)?;
            pushed += docs.len();
        }

        let since = (cursors.last_pull_epoch - REMOTE_OVERLAP_MS).max(0);
        let remote = self.backend.fetch_documents_updated_since(since).await?;
        let mut written = 0usize;
        if !remote.is_empty() {
            written = self.storage.import_documents(&remote)?;
            cursors.last_pull_epoch = cursors.last_pull_epoch.max(max_updated_epoch(&remote));
        }

        self.persist(&mut targets, &cursors)?;
        tracing::info!(
            reason,
            backend = self.backend.label(),
            pushed,
            pulled = remote.len(),
            written,
            "sync cycle complete"
        );
        Ok(())
    }

    async fn push_prompt(&self, id: &str) -> Result<()> {
        let Some(prompt) = self.storage.get_prompt(id)? else {
            tracing::warn!(prompt_id = id, "prompt vanished before sync");
            return Ok(());
        };
        let mut docs = Vec::with_capacity(2);
        if let Some(session) =
            self.storage.get_session_by_content_id(&prompt.content_session_id)?
        {
            docs.push(session_document_for_event(&session, prompt.created_at_epoch));
        }
        docs.push(prompt_document(&prompt));
        self.push_documents(docs).await
    }

    async fn push_observation(&self, id: &str) -> Result<()> {
        let Some(observation) = self.storage.get_observation(id)? else {
            tracing::warn!(observation_id = id, "observation vanished before sync");
            return Ok(());
        };
        let mut docs = Vec::with_capacity(2);
        if let Some(session) =
            self.storage.get_session_by_memory_id(&observation.memory_session_id)?
        {
            docs.push(session_document_for_event(&session, observation.created_at_epoch));
        }
        docs.push(observation_document(&observation)?);
        self.push_documents(docs).await
    }

    async fn push_summary(&self, id: &str) -> Result<()> {
        let Some(summary) = self.storage.get_summary(id)? else {
            tracing::warn!(summary_id = id, "summary vanished before sync");
            return Ok(());
        };
        let mut docs = Vec::with_capacity(2);
        if let Some(session) =
            self.storage.get_session_by_memory_id(&summary.memory_session_id)?
        {
            docs.push(session_document_for_event(&session, summary.created_at_epoch));
        }
        docs.push(summary_document(&summary)?);
        self.push_documents(docs).await
    }

    /// Minimal event-driven cycle: push the documents and raise the local
    /// push cursor. No pull.
    async fn push_documents(&self, docs: Vec<MemoryDocument>) -> Result<()> {
        self.ensure_backend_ready().await?;
        let docs = dedup_and_sort(docs);
        if docs.is_empty() {
            return Ok(());
        }
        self.backend.upsert_documents(&docs).await?;
        let (mut targets, mut cursors) = self.cursors();
        cursors.last_local_push_epoch =
            cursors.last_local_push_epoch.max(max_updated_epoch(&docs));
        self.persist(&mut targets, &cursors)?;
        Ok(())
    }

    /// Every row in the local store, as documents.
    fn collect_all_documents(&self) -> Result<Vec<MemoryDocument>> {
        let mut docs = Vec::new();
        for session in self.storage.get_all_sessions()? {
            docs.push(session_document(&session));
        }
        for prompt in self.storage.get_all_prompts()? {
            docs.push(prompt_document(&prompt));
        }
        for observation in self.storage.get_all_observations()? {
            docs.push(observation_document(&observation)?);
        }
        for summary in self.storage.get_all_summaries()? {
            docs.push(summary_document(&summary)?);
        }
        Ok(dedup_and_sort(docs))
    }

    /// Rows created at or after `since`, each with its owning session
    /// piggybacked so late-arriving session fields propagate.
    fn collect_documents_since(&self, since: i64) -> Result<Vec<MemoryDocument>> {
        let mut docs = Vec::new();
        for prompt in self.storage.get_prompts_since(since)? {
            if let Some(session) =
                self.storage.get_session_by_content_id(&prompt.content_session_id)?
            {
                docs.push(session_document_for_event(&session, prompt.created_at_epoch));
            }
            docs.push(prompt_document(&prompt));
        }
        for observation in self.storage.get_observations_since(since)? {
            if let Some(session) =
                self.storage.get_session_by_memory_id(&observation.memory_session_id)?
            {
                docs.push(session_document_for_event(&session, observation.created_at_epoch));
            }
            docs.push(observation_document(&observation)?);
        }
        for summary in self.storage.get_summaries_since(since)? {
            if let Some(session) =
                self.storage.get_session_by_memory_id(&summary.memory_session_id)?
            {
                docs.push(session_document_for_event(&session, summary.created_at_epoch));
            }
            docs.push(summary_document(&summary)?);
        }
        Ok(dedup_and_sort(docs))
    }
}

fn max_updated_epoch(docs: &[MemoryDocument]) -> i64 {
    docs.iter().map(|doc| doc.updated_at_epoch).max().unwrap_or(0)
}

/// Deduplicate by id keeping the highest `updatedAtEpoch`, then order
/// ascending by `(updatedAtEpoch, id)`.
fn dedup_and_sort(docs: Vec<MemoryDocument>) -> Vec<MemoryDocument> {
    let mut by_id: HashMap<String, MemoryDocument> = HashMap::with_capacity(docs.len());
    for doc in docs {
        match by_id.get(&doc.id) {
            Some(existing) if existing.updated_at_epoch >= doc.updated_at_epoch => {},
            _ => {
                by_id.insert(doc.id.clone(), doc);
            },
        }
    }
    let mut out: Vec<MemoryDocument> = by_id.into_values().collect();
    out.sort_by(|a, b| a.updated_at_epoch.cmp(&b.updated_at_epoch).then_with(|| a.id.cmp(&b.id)));
    out
}

#[cfg(test)]
mod tests {
    use agent_mem_core::SessionRecord;

    use super::*;

    #[test]
    fn dedup_keeps_highest_updated_epoch_and_sorts() {
        let mut session = SessionRecord::new("c1", "p");
        session.started_at_epoch = 100;
        let mut other = SessionRecord::new("c2", "p");
        other.started_at_epoch = 50;

        let docs = vec![
            session_document_for_event(&session, 300),
            session_document_for_event(&session, 500),
            session_document(&other),
        ];
        let deduped = dedup_and_sort(docs);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "session:c2");
        assert_eq!(deduped[1].id, "session:c1");
        assert_eq!(deduped[1].updated_at_epoch, 500);
    }

    #[test]
    fn max_epoch_of_empty_batch_is_zero() {
        assert_eq!(max_updated_epoch(&[]), 0);
    }
}
