use agent_mem_core::UserPromptRecord;
use anyhow::Result;
use rusqlite::params;

use super::{get_conn, log_row_error, Storage};

// Prompts do not carry a project of their own: it is filled from the owning
// session, or left empty when no session exists locally.
const PROMPT_SELECT: &str = "SELECT p.id, p.content_session_id, p.prompt_number, p.prompt_text, \
                             COALESCE(s.project, '') AS project, p.created_at, p.created_at_epoch \
                             FROM user_prompts p \
                             LEFT JOIN sessions s ON s.content_session_id = p.content_session_id";

impl Storage {
    /// Save or replace a user prompt row.
    pub fn save_user_prompt(&self, prompt: &UserPromptRecord) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        conn.execute(
            "INSERT OR REPLACE INTO user_prompts
               (id, content_session_id, prompt_number, prompt_text, created_at, created_at_epoch)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                prompt.id,
                prompt.content_session_id,
                prompt.prompt_number,
                prompt.prompt_text,
                prompt.created_at,
                prompt.created_at_epoch,
            ],
        )?;
        Ok(())
    }

    /// Get a prompt by row id.
    pub fn get_prompt(&self, id: &str) -> Result<Option<UserPromptRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("{PROMPT_SELECT} WHERE p.id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_prompt(row)?))
        } else {
            Ok(None)
        }
    }

    /// Full scan, ascending by creation time.
    pub fn get_all_prompts(&self) -> Result<Vec<UserPromptRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("{PROMPT_SELECT} ORDER BY p.created_at_epoch ASC");
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt.query_map([], row_to_prompt)?.filter_map(log_row_error).collect();
        Ok(results)
    }

    /// Prompts created at or after `since` (epoch ms), ascending.
    pub fn get_prompts_since(&self, since: i64) -> Result<Vec<UserPromptRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql =
            format!("{PROMPT_SELECT} WHERE p.created_at_epoch >= ?1 ORDER BY p.created_at_epoch ASC");
        let mut stmt = conn.prepare(&sql)?;
        let results =
            stmt.query_map(params![since], row_to_prompt)?.filter_map(log_row_error).collect();
        Ok(results)
    }
}

fn row_to_prompt(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserPromptRecord> {
    let mut prompt = UserPromptRecord::new(
        row.get::<_, String>(1)?,
        row.get(2)?,
        row.get::<_, String>(3)?,
    );
    prompt.id = row.get(0)?;
    prompt.project = row.get(4)?;
    prompt.created_at = row.get(5)?;
    prompt.created_at_epoch = row.get(6)?;
    Ok(prompt)
}
