//! Schema migrations, keyed on SQLite's `user_version`.

use rusqlite::Connection;

pub(crate) const SCHEMA_VERSION: i32 = 1;

const V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    content_session_id TEXT PRIMARY KEY,
    memory_session_id TEXT UNIQUE,
    project TEXT NOT NULL DEFAULT '',
    user_prompt TEXT,
    custom_title TEXT,
    started_at TEXT NOT NULL,
    started_at_epoch INTEGER NOT NULL,
    completed_at TEXT,
    completed_at_epoch INTEGER,
    status TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS user_prompts (
    id TEXT PRIMARY KEY,
    content_session_id TEXT NOT NULL,
    prompt_number INTEGER NOT NULL,
    prompt_text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    created_at_epoch INTEGER NOT NULL,
    UNIQUE(content_session_id, prompt_number)
);

CREATE TABLE IF NOT EXISTS observations (
    id TEXT PRIMARY KEY,
    memory_session_id TEXT NOT NULL,
    text TEXT,
    observation_type TEXT NOT NULL,
    title TEXT,
    subtitle TEXT,
    facts TEXT,
    narrative TEXT,
    concepts TEXT,
    files_read TEXT,
    files_modified TEXT,
    prompt_number INTEGER,
    discovery_tokens INTEGER,
    created_at TEXT NOT NULL,
    created_at_epoch INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS session_summaries (
    id TEXT PRIMARY KEY,
    memory_session_id TEXT NOT NULL,
    request TEXT,
    investigated TEXT,
    learned TEXT,
    completed TEXT,
    next_steps TEXT,
    notes TEXT,
    files_read TEXT,
    files_edited TEXT,
    prompt_number INTEGER,
    discovery_tokens INTEGER,
    created_at TEXT NOT NULL,
    created_at_epoch INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at_epoch);
CREATE INDEX IF NOT EXISTS idx_prompts_created ON user_prompts(created_at_epoch);
CREATE INDEX IF NOT EXISTS idx_observations_session ON observations(memory_session_id);
CREATE INDEX IF NOT EXISTS idx_observations_created ON observations(created_at_epoch);
CREATE INDEX IF NOT EXISTS idx_summaries_session ON session_summaries(memory_session_id);
CREATE INDEX IF NOT EXISTS idx_summaries_created ON session_summaries(created_at_epoch);
";

pub(crate) fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "busy_timeout", 5000i32)?;

    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!("Database schema version: {} (target: {})", current_version, SCHEMA_VERSION);

    if current_version < 1i32 {
        tracing::info!("Running migration v1: initial schema");
        conn.execute_batch(V1_SQL)?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    Ok(())
}
