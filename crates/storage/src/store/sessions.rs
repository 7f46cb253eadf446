use agent_mem_core::{SessionRecord, SessionStatus};
use anyhow::Result;
use rusqlite::params;

use super::{get_conn, log_row_error, Storage};

pub(crate) const SESSION_COLUMNS: &str =
    "content_session_id, memory_session_id, project, user_prompt, \
     custom_title, started_at, started_at_epoch, completed_at, \
     completed_at_epoch, status";

impl Storage {
    /// Save or replace a session row.
    pub fn save_session(&self, session: &SessionRecord) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        conn.execute(
            "INSERT OR REPLACE INTO sessions
               (content_session_id, memory_session_id, project, user_prompt, custom_title,
                started_at, started_at_epoch, completed_at, completed_at_epoch, status)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.content_session_id,
                session.memory_session_id,
                session.project,
                session.user_prompt,
                session.custom_title,
                session.started_at,
                session.started_at_epoch,
                session.completed_at,
                session.completed_at_epoch,
                session.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Bind the secondary identity once it becomes known.
    pub fn assign_memory_session_id(
        &self,
        content_session_id: &str,
        memory_session_id: &str,
    ) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        conn.execute(
            "UPDATE sessions SET memory_session_id = ?1 WHERE content_session_id = ?2",
            params![memory_session_id, content_session_id],
        )?;
        Ok(())
    }

    /// Get a session by its primary identity.
    pub fn get_session_by_content_id(
        &self,
        content_session_id: &str,
    ) -> Result<Option<SessionRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE content_session_id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![content_session_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_session(row)?))
        } else {
            Ok(None)
        }
    }

    /// Get a session by its secondary identity.
    pub fn get_session_by_memory_id(
        &self,
        memory_session_id: &str,
    ) -> Result<Option<SessionRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE memory_session_id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![memory_session_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_session(row)?))
        } else {
            Ok(None)
        }
    }

    /// Full scan, ascending by start time.
    pub fn get_all_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at_epoch ASC");
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt.query_map([], row_to_session)?.filter_map(log_row_error).collect();
        Ok(results)
    }
}

pub(crate) fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let status_str: String = row.get(9)?;
    let status = status_str.parse::<SessionStatus>().unwrap_or_else(|_| {
        tracing::warn!(invalid_status = %status_str, "corrupt session status in DB, defaulting");
        SessionStatus::Active
    });
    let mut session = SessionRecord::new(row.get::<_, String>(0)?, row.get::<_, String>(2)?);
    session.memory_session_id = row.get(1)?;
    session.user_prompt = row.get(3)?;
    session.custom_title = row.get(4)?;
    session.started_at = row.get(5)?;
    session.started_at_epoch = row.get(6)?;
    session.completed_at = row.get(7)?;
    session.completed_at_epoch = row.get(8)?;
    session.status = status;
    Ok(session)
}
