//! Test fixtures and module declarations for storage tests.


use agent_mem_core::{ObservationRecord, SessionRecord, SummaryRecord, UserPromptRecord};
use tempfile::TempDir;

use crate::Storage;

pub fn create_test_storage() -> (Storage, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let storage = Storage::new(&db_path).unwrap();
    (storage, temp_dir)
}

pub fn test_session(content: &str, memory: Option<&str>, project: &str) -> SessionRecord {
    let mut session = SessionRecord::new(content, project);
    session.memory_session_id = memory.map(str::to_owned);
    session.started_at = "2026-01-01T00:00:00+00:00".to_owned();
    session.started_at_epoch = 1_000;
    session
}

pub fn test_prompt(content: &str, number: i64, text: &str, epoch: i64) -> UserPromptRecord {
    let mut prompt = UserPromptRecord::new(content, number, text);
    prompt.created_at = "2026-01-01T00:00:01+00:00".to_owned();
    prompt.created_at_epoch = epoch;
    prompt
}

pub fn test_observation(id: &str, memory: &str, epoch: i64) -> ObservationRecord {
    ObservationRecord::builder(id.to_owned(), memory.to_owned(), "discovery".to_owned())
        .title("Pool sizing")
        .narrative("The pool caps out at eight connections.")
        .facts(r#"["max_size is 8"]"#)
        .files_read(r#"["src/store/mod.rs"]"#)
        .created_at("2026-01-01T00:00:02+00:00", epoch)
        .build()
}

pub fn test_summary(id: &str, memory: &str, epoch: i64) -> SummaryRecord {
    SummaryRecord::builder(id.to_owned(), memory.to_owned())
        .request("Wire up the importer")
        .learned("Batches must apply sessions first")
        .prompt_number(1)
        .created_at("2026-01-01T00:00:03+00:00", epoch)
        .build()
}
