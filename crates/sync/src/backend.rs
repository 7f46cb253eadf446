//! Contract a remote document store must satisfy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use agent_mem_core::{canonical_hash, MemoryDocument};
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

/// Identity of a remote synchronization target.
///
/// The fingerprint is a SHA-256 over the canonical JSON of this descriptor:
/// rotating any field resets the cursors for that target without disturbing
/// others.
#[derive(Debug, Clone, Serialize)]
pub struct TargetDescriptor {
    pub provider: String,
    pub endpoint: String,
    pub database: String,
    pub container: String,
}

impl TargetDescriptor {
    /// Deterministic identity keying the cursor state file.
    pub fn fingerprint(&self) -> agent_mem_core::Result<String> {
        canonical_hash(self)
    }
}

/// Operations the engine requires from a remote document store.
///
/// All failures are transport/availability errors: the engine does not
/// distinguish provider-specific codes. A failing operation aborts the
/// current cycle, leaves cursors unchanged, and the next cycle retries.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Human-readable name used in logs.
    fn label(&self) -> &str;

    /// Stable identity of the (provider, endpoint, database, container)
    /// tuple this backend talks to.
    fn target_fingerprint(&self) -> &str;

    /// Ensure the remote container exists and is ready to receive upserts
    /// partitioned by document kind. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Write each document by its id, last writer wins. Must be safe to
    /// call with already-seen ids.
    async fn upsert_documents(&self, docs: &[MemoryDocument]) -> Result<()>;

    /// All documents with `updatedAtEpoch > epoch`, ascending by
    /// `updatedAtEpoch`. May return more than strictly new; overlap is
    /// handled by the importer.
    async fn fetch_documents_updated_since(&self, epoch: i64) -> Result<Vec<MemoryDocument>>;

    /// Release remote resources.
    async fn close(&self) -> Result<()>;
}

/// In-process backend holding documents in a map.
///
/// Reference implementation of the contract, used by the engine tests. The
/// failure toggles make one call fail so transient-error paths can be
/// exercised.
#[derive(Debug)]
pub struct MemoryBackend {
    label: String,
    fingerprint: String,
    docs: Mutex<HashMap<String, MemoryDocument>>,
    fail_next_upsert: AtomicBool,
    fail_next_fetch: AtomicBool,
}

impl MemoryBackend {
    /// Creates a backend labeled `label` with a fingerprint derived from it.
    pub fn new(label: impl Into<String>) -> agent_mem_core::Result<Self> {
        let label = label.into();
        let descriptor = TargetDescriptor {
            provider: "memory".to_owned(),
            endpoint: label.clone(),
            database: "claude-mem".to_owned(),
            container: "memory-records".to_owned(),
        };
        let fingerprint = descriptor.fingerprint()?;
        Ok(Self {
            label,
            fingerprint,
            docs: Mutex::new(HashMap::new()),
            fail_next_upsert: AtomicBool::new(false),
            fail_next_fetch: AtomicBool::new(false),
        })
    }

    /// Make the next `upsert_documents` call fail once.
    pub fn fail_next_upsert(&self) {
        self.fail_next_upsert.store(true, Ordering::SeqCst);
    }

    /// Make the next `fetch_documents_updated_since` call fail once.
    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    /// Snapshot of all stored documents.
    pub fn documents(&self) -> Vec<MemoryDocument> {
        self.docs.lock().values().cloned().collect()
    }

    /// Look up one stored document by id.
    pub fn document(&self, id: &str) -> Option<MemoryDocument> {
        self.docs.lock().get(id).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    /// Whether the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }

    /// Seed documents directly, bypassing the engine.
    pub fn seed(&self, docs: Vec<MemoryDocument>) {
        let mut map = self.docs.lock();
        for doc in docs {
            map.insert(doc.id.clone(), doc);
        }
    }
}

#[async_trait]
impl SyncBackend for MemoryBackend {
    fn label(&self) -> &str {
        &self.label
    }

    fn target_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[MemoryDocument]) -> Result<()> {
        if self.fail_next_upsert.swap(false, Ordering::SeqCst) {
            bail!("injected upsert failure");
        }
        let mut map = self.docs.lock();
        for doc in docs {
            map.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn fetch_documents_updated_since(&self, epoch: i64) -> Result<Vec<MemoryDocument>> {
        if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
            bail!("injected fetch failure");
        }
        let mut docs: Vec<MemoryDocument> = self
            .docs
            .lock()
            .values()
            .filter(|doc| doc.updated_at_epoch > epoch)
            .cloned()
            .collect();
        docs.sort_by(|a, b| {
            a.updated_at_epoch.cmp(&b.updated_at_epoch).then_with(|| a.id.cmp(&b.id))
        });
        Ok(docs)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use agent_mem_core::{prompt_document, UserPromptRecord};

    use super::*;

    fn doc(number: i64, epoch: i64) -> MemoryDocument {
        let mut prompt = UserPromptRecord::new("c1", number, "text");
        prompt.created_at_epoch = epoch;
        prompt_document(&prompt)
    }

    #[test]
    fn fingerprint_changes_with_every_descriptor_field() {
        let base = TargetDescriptor {
            provider: "azure-cosmos".to_owned(),
            endpoint: "https://a.example".to_owned(),
            database: "claude-mem".to_owned(),
            container: "memory-records".to_owned(),
        };
        let fingerprint = base.fingerprint().unwrap();
        assert_eq!(fingerprint.len(), 64);

        for rotated in [
            TargetDescriptor { provider: "other".to_owned(), ..base.clone() },
            TargetDescriptor { endpoint: "https://b.example".to_owned(), ..base.clone() },
            TargetDescriptor { database: "other-db".to_owned(), ..base.clone() },
            TargetDescriptor { container: "other-box".to_owned(), ..base.clone() },
        ] {
            assert_ne!(rotated.fingerprint().unwrap(), fingerprint);
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let backend = MemoryBackend::new("test").unwrap();
        let batch = vec![doc(1, 100), doc(2, 200)];

        backend.upsert_documents(&batch).await.unwrap();
        backend.upsert_documents(&batch).await.unwrap();

        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn fetch_filters_and_orders_by_updated_epoch() {
        let backend = MemoryBackend::new("test").unwrap();
        backend.upsert_documents(&[doc(3, 300), doc(1, 100), doc(2, 200)]).await.unwrap();

        let fetched = backend.fetch_documents_updated_since(100).await.unwrap();
        let epochs: Vec<i64> = fetched.iter().map(|d| d.updated_at_epoch).collect();
        // Strictly greater than the cursor, ascending.
        assert_eq!(epochs, vec![200, 300]);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let backend = MemoryBackend::new("test").unwrap();
        backend.fail_next_upsert();

        assert!(backend.upsert_documents(&[doc(1, 100)]).await.is_err());
        assert!(backend.upsert_documents(&[doc(1, 100)]).await.is_ok());
        assert_eq!(backend.len(), 1);
    }
}
