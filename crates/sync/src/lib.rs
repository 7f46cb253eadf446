//! Remote synchronization engine for agent-mem
//!
//! Reconciles the local store with a shared remote document store so memory
//! captured on one machine becomes visible on another. All work is funneled
//! through a serialized task queue; cursors advance only after successful
//! pushes, and every operation is idempotent across replays and overlapping
//! windows.

mod backend;
mod config;
mod cosmos;
mod engine;
mod queue;
mod state;

pub use backend::{MemoryBackend, SyncBackend, TargetDescriptor};
pub use config::{build_sync_engine, RemoteConfig, DEFAULT_CONTAINER, DEFAULT_DATABASE};
pub use cosmos::CosmosBackend;
pub use engine::{SyncEngine, DEFAULT_SYNC_INTERVAL_MS, LOCAL_OVERLAP_MS, REMOTE_OVERLAP_MS};
pub use queue::TaskQueue;
pub use state::{SyncStateStore, TargetCursors};
