//! Configuration gate: build the engine from settings, or stay disabled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_mem_storage::Storage;
use serde::Deserialize;

use crate::backend::SyncBackend;
use crate::cosmos::CosmosBackend;
use crate::engine::{SyncEngine, DEFAULT_SYNC_INTERVAL_MS};
use crate::state::SyncStateStore;

/// Default remote database name.
pub const DEFAULT_DATABASE: &str = "claude-mem";
/// Default remote container name.
pub const DEFAULT_CONTAINER: &str = "memory-records";

/// Remote synchronization settings as loaded by the host. All values arrive
/// as strings; parsing and defaulting happen here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Feature flag; anything but `"true"` leaves sync disabled.
    pub enabled: Option<String>,
    /// Backend provider tag. Only `azure-cosmos` is currently defined.
    pub provider: Option<String>,
    /// Provider endpoint URL.
    pub endpoint: Option<String>,
    /// Provider account key, opaque to the engine.
    pub account_key: Option<String>,
    /// Remote database name.
    pub database: Option<String>,
    /// Remote container name.
    pub container: Option<String>,
    /// Full-sync interval in milliseconds, as a positive integer.
    pub sync_interval_ms: Option<String>,
    /// Location of the cursor state file.
    pub state_path: Option<PathBuf>,
}

/// Build the engine, or return `None` when remote sync is disabled or
/// misconfigured. Never fails: the host's memory-capture path runs on the
/// local store alone.
#[must_use]
pub fn build_sync_engine(storage: Storage, config: &RemoteConfig) -> Option<SyncEngine> {
    if config.enabled.as_deref() != Some("true") {
        tracing::debug!("remote sync disabled");
        return None;
    }

    let provider = config.provider.as_deref().unwrap_or("");
    let backend: Arc<dyn SyncBackend> = match provider {
        "azure-cosmos" => {
            let (Some(endpoint), Some(key)) =
                (config.endpoint.as_deref(), config.account_key.as_deref())
            else {
                tracing::warn!("cosmos endpoint or account key missing, remote sync disabled");
                return None;
            };
            let database =
                config.database.clone().unwrap_or_else(|| DEFAULT_DATABASE.to_owned());
            let container =
                config.container.clone().unwrap_or_else(|| DEFAULT_CONTAINER.to_owned());
            match CosmosBackend::new(endpoint, key, database, container) {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to construct cosmos backend, remote sync disabled");
                    return None;
                },
            }
        },
        other => {
            tracing::warn!(provider = other, "unknown sync provider, remote sync disabled");
            return None;
        },
    };

    let interval_ms = parse_interval_ms(config.sync_interval_ms.as_deref());
    let state_path = config.state_path.clone().unwrap_or_else(default_state_path);

    Some(SyncEngine::new(
        storage,
        backend,
        SyncStateStore::new(state_path),
        Duration::from_millis(interval_ms),
    ))
}

fn parse_interval_ms(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return DEFAULT_SYNC_INTERVAL_MS;
    };
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => ms,
        _ => {
            tracing::warn!(
                value = raw,
                default = DEFAULT_SYNC_INTERVAL_MS,
                "invalid sync interval, using default"
            );
            DEFAULT_SYNC_INTERVAL_MS
        },
    }
}

fn default_state_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agent-mem")
        .join("sync-state.json")
}
