use agent_mem_core::SummaryRecord;
use anyhow::Result;
use rusqlite::params;

use super::{get_conn, log_row_error, Storage};

const SUMMARY_SELECT: &str =
    "SELECT m.id, m.memory_session_id, COALESCE(s.project, '') AS project, m.request, \
     m.investigated, m.learned, m.completed, m.next_steps, m.notes, m.files_read, m.files_edited, \
     m.prompt_number, m.discovery_tokens, m.created_at, m.created_at_epoch \
     FROM session_summaries m \
     LEFT JOIN sessions s ON s.memory_session_id = m.memory_session_id";

impl Storage {
    /// Save a summary row. Returns `false` when the id already exists.
    pub fn save_summary(&self, summary: &SummaryRecord) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO session_summaries
               (id, memory_session_id, request, investigated, learned, completed, next_steps,
                notes, files_read, files_edited, prompt_number, discovery_tokens,
                created_at, created_at_epoch)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                summary.id,
                summary.memory_session_id,
                summary.request,
                summary.investigated,
                summary.learned,
                summary.completed,
                summary.next_steps,
                summary.notes,
                summary.files_read,
                summary.files_edited,
                summary.prompt_number,
                summary.discovery_tokens,
                summary.created_at,
                summary.created_at_epoch,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Get a summary by row id.
    pub fn get_summary(&self, id: &str) -> Result<Option<SummaryRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("{SUMMARY_SELECT} WHERE m.id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_summary(row)?))
        } else {
            Ok(None)
        }
    }

    /// Full scan, ascending by creation time.
    pub fn get_all_summaries(&self) -> Result<Vec<SummaryRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("{SUMMARY_SELECT} ORDER BY m.created_at_epoch ASC");
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt.query_map([], row_to_summary)?.filter_map(log_row_error).collect();
        Ok(results)
    }

    /// Summaries created at or after `since` (epoch ms), ascending.
    pub fn get_summaries_since(&self, since: i64) -> Result<Vec<SummaryRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "{SUMMARY_SELECT} WHERE m.created_at_epoch >= ?1 ORDER BY m.created_at_epoch ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let results =
            stmt.query_map(params![since], row_to_summary)?.filter_map(log_row_error).collect();
        Ok(results)
    }
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRecord> {
    let mut summary = SummaryRecord::builder(row.get(0)?, row.get(1)?).build();
    summary.project = row.get(2)?;
    summary.request = row.get(3)?;
    summary.investigated = row.get(4)?;
    summary.learned = row.get(5)?;
    summary.completed = row.get(6)?;
    summary.next_steps = row.get(7)?;
    summary.notes = row.get(8)?;
    summary.files_read = row.get(9)?;
    summary.files_edited = row.get(10)?;
    summary.prompt_number = row.get(11)?;
    summary.discovery_tokens = row.get(12)?;
    summary.created_at = row.get(13)?;
    summary.created_at_epoch = row.get(14)?;
    Ok(summary)
}
