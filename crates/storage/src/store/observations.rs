use agent_mem_core::ObservationRecord;
use anyhow::Result;
use rusqlite::params;

use super::{get_conn, log_row_error, Storage};

const OBSERVATION_SELECT: &str =
    "SELECT o.id, o.memory_session_id, COALESCE(s.project, '') AS project, o.text, \
     o.observation_type, o.title, o.subtitle, o.facts, o.narrative, o.concepts, o.files_read, \
     o.files_modified, o.prompt_number, o.discovery_tokens, o.created_at, o.created_at_epoch \
     FROM observations o \
     LEFT JOIN sessions s ON s.memory_session_id = o.memory_session_id";

impl Storage {
    /// Save an observation row. Returns `false` when the id already exists.
    pub fn save_observation(&self, observation: &ObservationRecord) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO observations
               (id, memory_session_id, text, observation_type, title, subtitle, facts, narrative,
                concepts, files_read, files_modified, prompt_number, discovery_tokens,
                created_at, created_at_epoch)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                observation.id,
                observation.memory_session_id,
                observation.text,
                observation.observation_type,
                observation.title,
                observation.subtitle,
                observation.facts,
                observation.narrative,
                observation.concepts,
                observation.files_read,
                observation.files_modified,
                observation.prompt_number,
                observation.discovery_tokens,
                observation.created_at,
                observation.created_at_epoch,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Get an observation by row id.
    pub fn get_observation(&self, id: &str) -> Result<Option<ObservationRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("{OBSERVATION_SELECT} WHERE o.id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_observation(row)?))
        } else {
            Ok(None)
        }
    }

    /// Full scan, ascending by creation time.
    pub fn get_all_observations(&self) -> Result<Vec<ObservationRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!("{OBSERVATION_SELECT} ORDER BY o.created_at_epoch ASC");
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt.query_map([], row_to_observation)?.filter_map(log_row_error).collect();
        Ok(results)
    }

    /// Observations created at or after `since` (epoch ms), ascending.
    pub fn get_observations_since(&self, since: i64) -> Result<Vec<ObservationRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "{OBSERVATION_SELECT} WHERE o.created_at_epoch >= ?1 ORDER BY o.created_at_epoch ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let results =
            stmt.query_map(params![since], row_to_observation)?.filter_map(log_row_error).collect();
        Ok(results)
    }
}

fn row_to_observation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ObservationRecord> {
    let mut observation = ObservationRecord::builder(
        row.get(0)?,
        row.get(1)?,
        row.get(4)?,
    )
    .build();
    observation.project = row.get(2)?;
    observation.text = row.get(3)?;
    observation.title = row.get(5)?;
    observation.subtitle = row.get(6)?;
    observation.facts = row.get(7)?;
    observation.narrative = row.get(8)?;
    observation.concepts = row.get(9)?;
    observation.files_read = row.get(10)?;
    observation.files_modified = row.get(11)?;
    observation.prompt_number = row.get(12)?;
    observation.discovery_tokens = row.get(13)?;
    observation.created_at = row.get(14)?;
    observation.created_at_epoch = row.get(15)?;
    Ok(observation)
}
