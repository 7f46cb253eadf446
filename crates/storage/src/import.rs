//! Import of remote documents into the local store.
//!
//! One batch, one transaction. The batch is re-ordered so sessions apply
//! before the prompts, observations and summaries that reference them;
//! documents violating a local invariant are skipped with a warning and the
//! rest of the batch still applies.

use agent_mem_core::{
    DocumentBody, MemoryDocument, ObservationPayload, PromptPayload, SessionPayload,
    SessionRecord, SessionStatus, SummaryPayload,
};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension as _};

use crate::store::sessions::{row_to_session, SESSION_COLUMNS};
use crate::store::{get_conn, Storage};

impl Storage {
    /// Merge a batch of remote documents into the local store.
    ///
    /// Runs inside a single transaction and returns the number of rows
    /// actually written. Importing the same batch twice writes zero rows
    /// the second time.
    pub fn import_documents(&self, docs: &[MemoryDocument]) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let tx = conn.unchecked_transaction()?;

        let mut ordered: Vec<&MemoryDocument> = docs.iter().collect();
        ordered.sort_by_key(|doc| doc.kind().import_rank());

        let mut written = 0usize;
        for doc in ordered {
            let wrote = match &doc.body {
                DocumentBody::Session(payload) => import_session(&tx, payload)?,
                DocumentBody::Prompt(payload) => import_prompt(&tx, payload)?,
                DocumentBody::Observation(payload) => import_observation(&tx, payload)?,
                DocumentBody::Summary(payload) => import_summary(&tx, payload)?,
            };
            if wrote {
                written += 1;
            }
        }

        tx.commit()?;
        Ok(written)
    }
}

fn import_session(conn: &Connection, payload: &SessionPayload) -> Result<bool> {
    let incoming_status = parse_status(&payload.status);
    let memory_session_id = resolve_memory_session_id(conn, payload)?;

    let Some(current) = load_session(conn, &payload.content_session_id)? else {
        conn.execute(
            "INSERT INTO sessions
               (content_session_id, memory_session_id, project, user_prompt, custom_title,
                started_at, started_at_epoch, completed_at, completed_at_epoch, status)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                payload.content_session_id,
                memory_session_id,
                payload.project,
                payload.user_prompt,
                payload.custom_title,
                payload.started_at,
                payload.started_at_epoch,
                payload.completed_at,
                payload.completed_at_epoch,
                incoming_status.as_str(),
            ],
        )?;
        return Ok(true);
    };

    let merged = merge_session(&current, payload, memory_session_id, incoming_status);
    if merged == current {
        return Ok(false);
    }
    conn.execute(
        "UPDATE sessions SET memory_session_id = ?1, project = ?2, user_prompt = ?3,
                custom_title = ?4, started_at = ?5, started_at_epoch = ?6, completed_at = ?7,
                completed_at_epoch = ?8, status = ?9
           WHERE content_session_id = ?10",
        params![
            merged.memory_session_id,
            merged.project,
            merged.user_prompt,
            merged.custom_title,
            merged.started_at,
            merged.started_at_epoch,
            merged.completed_at,
            merged.completed_at_epoch,
            merged.status.as_str(),
            merged.content_session_id,
        ],
    )?;
    Ok(true)
}

/// Field-wise merge of an incoming session into the current row. Last
/// writer wins on the mutable fields; the earliest writer is authoritative
/// on start time.
fn merge_session(
    current: &SessionRecord,
    payload: &SessionPayload,
    memory_session_id: Option<String>,
    incoming_status: SessionStatus,
) -> SessionRecord {
    let mut merged = current.clone();
    if memory_session_id.is_some() {
        merged.memory_session_id = memory_session_id;
    }
    if !payload.project.is_empty() {
        merged.project = payload.project.clone();
    }
    if payload.user_prompt.as_deref().is_some_and(|p| !p.is_empty()) {
        merged.user_prompt = payload.user_prompt.clone();
    }
    if payload.custom_title.is_some() {
        merged.custom_title = payload.custom_title.clone();
    }
    if current.started_at.is_empty() {
        merged.started_at = payload.started_at.clone();
    }
    if current.started_at_epoch == 0 {
        merged.started_at_epoch = payload.started_at_epoch;
    }
    if payload.completed_at.is_some() {
        merged.completed_at = payload.completed_at.clone();
    }
    if payload.completed_at_epoch.is_some() {
        merged.completed_at_epoch = payload.completed_at_epoch;
    }
    if incoming_status.priority() >= current.status.priority() {
        merged.status = incoming_status;
    }
    merged
}

/// Keeps the local binding when an incoming `memory_session_id` is already
/// bound to a different session, preserving uniqueness under adversarial
/// replicas without aborting the batch.
fn resolve_memory_session_id(
    conn: &Connection,
    payload: &SessionPayload,
) -> Result<Option<String>> {
    let Some(memory_id) = payload.memory_session_id.as_deref() else {
        return Ok(None);
    };
    let owner: Option<String> = conn
        .query_row(
            "SELECT content_session_id FROM sessions WHERE memory_session_id = ?1",
            params![memory_id],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        Some(existing) if existing != payload.content_session_id => {
            tracing::warn!(
                memory_session_id = memory_id,
                bound_to = %existing,
                incoming = %payload.content_session_id,
                "memory session id already bound to another session, keeping local binding"
            );
            Ok(None)
        },
        _ => Ok(Some(memory_id.to_owned())),
    }
}

fn import_prompt(conn: &Connection, payload: &PromptPayload) -> Result<bool> {
    let duplicate: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM user_prompts WHERE content_session_id = ?1 AND prompt_number = ?2",
            params![payload.content_session_id, payload.prompt_number],
            |row| row.get(0),
        )
        .optional()?;
    if duplicate.is_some() {
        return Ok(false);
    }
    if !session_exists_by_content_id(conn, &payload.content_session_id)? {
        tracing::warn!(
            content_session_id = %payload.content_session_id,
            prompt_number = payload.prompt_number,
            "skipping prompt for unknown session"
        );
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO user_prompts
           (id, content_session_id, prompt_number, prompt_text, created_at, created_at_epoch)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            uuid::Uuid::new_v4().to_string(),
            payload.content_session_id,
            payload.prompt_number,
            payload.prompt_text,
            payload.created_at,
            payload.created_at_epoch,
        ],
    )?;
    Ok(true)
}

fn import_observation(conn: &Connection, payload: &ObservationPayload) -> Result<bool> {
    if !session_exists_by_memory_id(conn, &payload.memory_session_id)? {
        tracing::warn!(
            memory_session_id = %payload.memory_session_id,
            "skipping observation for unknown session"
        );
        return Ok(false);
    }
    let duplicate: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM observations
               WHERE memory_session_id = ?1 AND created_at_epoch = ?2 AND observation_type = ?3
                 AND COALESCE(title, '') = COALESCE(?4, '')
                 AND COALESCE(narrative, '') = COALESCE(?5, '')",
            params![
                payload.memory_session_id,
                payload.created_at_epoch,
                payload.observation_type,
                payload.title,
                payload.narrative,
            ],
            |row| row.get(0),
        )
        .optional()?;
    if duplicate.is_some() {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO observations
           (id, memory_session_id, text, observation_type, title, subtitle, facts, narrative,
            concepts, files_read, files_modified, prompt_number, discovery_tokens,
            created_at, created_at_epoch)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            uuid::Uuid::new_v4().to_string(),
            payload.memory_session_id,
            payload.text,
            payload.observation_type,
            payload.title,
            payload.subtitle,
            payload.facts,
            payload.narrative,
            payload.concepts,
            payload.files_read,
            payload.files_modified,
            payload.prompt_number,
            payload.discovery_tokens,
            payload.created_at,
            payload.created_at_epoch,
        ],
    )?;
    Ok(true)
}

fn import_summary(conn: &Connection, payload: &SummaryPayload) -> Result<bool> {
    if !session_exists_by_memory_id(conn, &payload.memory_session_id)? {
        tracing::warn!(
            memory_session_id = %payload.memory_session_id,
            "skipping summary for unknown session"
        );
        return Ok(false);
    }
    let duplicate: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM session_summaries
               WHERE memory_session_id = ?1 AND created_at_epoch = ?2
                 AND COALESCE(prompt_number, -1) = COALESCE(?3, -1)",
            params![payload.memory_session_id, payload.created_at_epoch, payload.prompt_number],
            |row| row.get(0),
        )
        .optional()?;
    if duplicate.is_some() {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO session_summaries
           (id, memory_session_id, request, investigated, learned, completed, next_steps, notes,
            files_read, files_edited, prompt_number, discovery_tokens, created_at,
            created_at_epoch)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            uuid::Uuid::new_v4().to_string(),
            payload.memory_session_id,
            payload.request,
            payload.investigated,
            payload.learned,
            payload.completed,
            payload.next_steps,
            payload.notes,
            payload.files_read,
            payload.files_edited,
            payload.prompt_number,
            payload.discovery_tokens,
            payload.created_at,
            payload.created_at_epoch,
        ],
    )?;
    Ok(true)
}

fn load_session(conn: &Connection, content_session_id: &str) -> Result<Option<SessionRecord>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE content_session_id = ?1");
    Ok(conn.query_row(&sql, params![content_session_id], row_to_session).optional()?)
}

fn session_exists_by_content_id(conn: &Connection, content_session_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sessions WHERE content_session_id = ?1",
            params![content_session_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn session_exists_by_memory_id(conn: &Connection, memory_session_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sessions WHERE memory_session_id = ?1",
            params![memory_session_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn parse_status(raw: &str) -> SessionStatus {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(status = raw, "unknown session status in document, treating as active");
        SessionStatus::Active
    })
}
