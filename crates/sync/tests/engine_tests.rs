//! End-to-end engine tests over an in-memory backend and a throwaway
//! local store.

use std::sync::Arc;
use std::time::Duration;

use agent_mem_core::{
    observation_document, prompt_document, session_document, summary_document, DocumentBody,
    MemoryDocument, ObservationRecord, SessionRecord, SummaryRecord, UserPromptRecord,
};
use agent_mem_storage::Storage;
use agent_mem_sync::{MemoryBackend, SyncBackend, SyncEngine, SyncStateStore, TargetCursors};
use tempfile::TempDir;

struct Harness {
    storage: Storage,
    backend: Arc<MemoryBackend>,
    engine: SyncEngine,
    state: SyncStateStore,
    _dir: TempDir,
}

fn harness(sync_interval: Duration) -> Harness {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(&dir.path().join("local.db")).unwrap();
    let backend = Arc::new(MemoryBackend::new("test-target").unwrap());
    let state = SyncStateStore::new(dir.path().join("sync-state.json"));
    let engine = SyncEngine::new(
        storage.clone(),
        Arc::clone(&backend) as Arc<dyn SyncBackend>,
        state.clone(),
        sync_interval,
    );
    Harness { storage, backend, engine, state, _dir: dir }
}

fn cursors(harness: &Harness) -> TargetCursors {
    harness
        .state
        .load()
        .get(harness.backend.target_fingerprint())
        .cloned()
        .unwrap_or_default()
}

fn session(content: &str, memory: Option<&str>, project: &str, epoch: i64) -> SessionRecord {
    let mut session = SessionRecord::new(content, project);
    session.memory_session_id = memory.map(str::to_owned);
    session.started_at = "2026-01-01T00:00:00+00:00".to_owned();
    session.started_at_epoch = epoch;
    session
}

fn prompt(content: &str, number: i64, text: &str, epoch: i64) -> UserPromptRecord {
    let mut prompt = UserPromptRecord::new(content, number, text);
    prompt.created_at = "2026-01-01T00:00:01+00:00".to_owned();
    prompt.created_at_epoch = epoch;
    prompt
}

fn observation(id: &str, memory: &str, epoch: i64) -> ObservationRecord {
    ObservationRecord::builder(id.to_owned(), memory.to_owned(), "discovery".to_owned())
        .title("Cursor handling")
        .narrative("Cursors advance only after a successful push.")
        .created_at("2026-01-01T00:00:02+00:00", epoch)
        .build()
}

fn summary(id: &str, memory: &str, epoch: i64) -> SummaryRecord {
    SummaryRecord::builder(id.to_owned(), memory.to_owned())
        .request("Check the overlap window")
        .prompt_number(1)
        .created_at("2026-01-01T00:00:03+00:00", epoch)
        .build()
}

fn session_payload(doc: &MemoryDocument) -> &agent_mem_core::SessionPayload {
    match &doc.body {
        DocumentBody::Session(payload) => payload,
        other => panic!("expected session payload, got {other:?}"),
    }
}

#[tokio::test]
async fn bootstrap_pushes_local_and_imports_remote() {
    let harness = harness(Duration::from_secs(30));

    // Local memory captured before the first sync.
    harness.storage.save_session(&session("local-c", Some("local-m"), "P", 1_000)).unwrap();
    harness.storage.save_user_prompt(&prompt("local-c", 1, "hi", 1_100)).unwrap();
    harness.storage.save_observation(&observation("l-obs", "local-m", 1_200)).unwrap();
    harness.storage.save_summary(&summary("l-sum", "local-m", 1_300)).unwrap();

    // Remote memory captured by another machine.
    let remote_session = session("remote-c", Some("remote-m"), "Q", 2_000);
    let remote_prompt = prompt("remote-c", 1, "yo", 2_100);
    let remote_observation = observation("r-obs", "remote-m", 2_200);
    let remote_summary = summary("r-sum", "remote-m", 2_300);
    harness.backend.seed(vec![
        session_document(&remote_session),
        prompt_document(&remote_prompt),
        observation_document(&remote_observation).unwrap(),
        summary_document(&remote_summary).unwrap(),
    ]);

    harness.engine.perform_synchronization("startup", true);
    harness.engine.flush().await;

    // Remote now holds the local documents under their deterministic ids.
    assert!(harness.backend.document("session:local-c").is_some());
    assert!(harness.backend.document("prompt:local-c:1").is_some());
    assert_eq!(harness.backend.len(), 8);

    // Local now holds the remote rows, one of each kind.
    assert_eq!(harness.storage.get_all_sessions().unwrap().len(), 2);
    assert_eq!(harness.storage.get_all_prompts().unwrap().len(), 2);
    assert_eq!(harness.storage.get_all_observations().unwrap().len(), 2);
    assert_eq!(harness.storage.get_all_summaries().unwrap().len(), 2);

    let remote_row = harness.storage.get_session_by_content_id("remote-c").unwrap().unwrap();
    assert_eq!(remote_row.memory_session_id.as_deref(), Some("remote-m"));
    assert_eq!(remote_row.project, "Q");

    let cursors = cursors(&harness);
    assert!(cursors.bootstrap_complete);
    assert_eq!(cursors.last_local_push_epoch, 1_300);
    assert_eq!(cursors.last_pull_epoch, 2_300);
}

#[tokio::test]
async fn piggybacked_session_propagates_late_memory_id() {
    let harness = harness(Duration::from_secs(30));

    harness.storage.save_session(&session("pc", None, "P", 1_000)).unwrap();
    let first_prompt = prompt("pc", 1, "hello", 1_100);
    harness.storage.save_user_prompt(&first_prompt).unwrap();

    harness.engine.schedule_user_prompt_sync(&first_prompt.id);
    harness.engine.flush().await;

    let doc = harness.backend.document("session:pc").unwrap();
    assert_eq!(session_payload(&doc).memory_session_id, None);

    // The memory id arrives later; an observation event carries it along.
    harness.storage.assign_memory_session_id("pc", "pm").unwrap();
    harness.storage.save_observation(&observation("obs-1", "pm", 2_000)).unwrap();
    harness.engine.schedule_observation_sync("obs-1");
    harness.engine.flush().await;

    let doc = harness.backend.document("session:pc").unwrap();
    assert_eq!(session_payload(&doc).memory_session_id.as_deref(), Some("pm"));
    assert_eq!(doc.updated_at_epoch, 2_000);

    assert!(cursors(&harness).last_local_push_epoch >= 2_000);
}

#[tokio::test]
async fn overlapping_pulls_do_not_duplicate_rows() {
    let harness = harness(Duration::from_secs(30));

    let remote_session = session("remote-c", None, "Q", 2_000);
    let remote_prompt = prompt("remote-c", 1, "yo", 2_100);
    harness.backend.seed(vec![
        session_document(&remote_session),
        prompt_document(&remote_prompt),
    ]);

    // Two full cycles: the second pull re-fetches the same documents
    // through the overlap window.
    harness.engine.perform_synchronization("first", false);
    harness.engine.flush().await;
    harness.engine.perform_synchronization("second", false);
    harness.engine.flush().await;

    assert_eq!(harness.storage.get_all_prompts().unwrap().len(), 1);
    assert_eq!(harness.storage.get_all_sessions().unwrap().len(), 1);
}

#[tokio::test]
async fn transient_backend_failure_leaves_cursors_unchanged() {
    let harness = harness(Duration::from_secs(30));

    harness.storage.save_session(&session("c1", Some("m1"), "P", 1_000)).unwrap();
    harness.storage.save_user_prompt(&prompt("c1", 1, "hi", 1_100)).unwrap();

    harness.backend.fail_next_upsert();
    harness.engine.perform_synchronization("doomed", true);
    harness.engine.flush().await;

    assert_eq!(cursors(&harness), TargetCursors::default());
    assert!(harness.backend.is_empty());

    // Backend recovered: the next cycle completes and cursors advance.
    harness.engine.perform_synchronization("retry", true);
    harness.engine.flush().await;

    let cursors = cursors(&harness);
    assert!(cursors.bootstrap_complete);
    assert_eq!(cursors.last_local_push_epoch, 1_100);
    assert!(harness.backend.document("prompt:c1:1").is_some());
}

#[tokio::test]
async fn interval_timer_syncs_without_explicit_scheduling() {
    let harness = harness(Duration::from_millis(50));

    harness.engine.start();
    harness.engine.flush().await;

    harness.storage.save_session(&session("c1", Some("m1"), "P", 1_000)).unwrap();
    let the_prompt = prompt("c1", 1, "hi", 1_100);
    harness.storage.save_user_prompt(&the_prompt).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.engine.flush().await;

    assert!(harness.backend.document("session:c1").is_some());
    assert!(harness.backend.document("prompt:c1:1").is_some());
    assert_eq!(harness.backend.len(), 2);

    // A host hook firing for the same row introduces no duplicates.
    harness.engine.schedule_user_prompt_sync(&the_prompt.id);
    harness.engine.flush().await;
    assert_eq!(harness.backend.len(), 2);

    harness.engine.close().await;
}

#[tokio::test]
async fn close_drains_and_ignores_later_schedules() {
    let harness = harness(Duration::from_millis(50));

    harness.storage.save_session(&session("c1", Some("m1"), "P", 1_000)).unwrap();
    harness.engine.start();
    harness.engine.close().await;

    let closed_at = harness.backend.len();
    harness.storage.save_user_prompt(&prompt("c1", 1, "late", 9_000)).unwrap();
    harness.engine.perform_synchronization("after-close", false);
    harness.engine.flush().await;

    assert_eq!(harness.backend.len(), closed_at);
}

#[tokio::test]
async fn event_sync_for_missing_row_is_a_logged_no_op() {
    let harness = harness(Duration::from_secs(30));

    harness.engine.schedule_user_prompt_sync("missing-row");
    harness.engine.schedule_observation_sync("missing-row");
    harness.engine.schedule_summary_sync("missing-row");
    harness.engine.flush().await;

    assert!(harness.backend.is_empty());
    assert_eq!(cursors(&harness), TargetCursors::default());
}
