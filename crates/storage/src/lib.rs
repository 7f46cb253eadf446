//! SQLite local store for agent-mem
//!
//! Connection pool, schema migration, the sync-facing readers (full scans,
//! since-epoch scans, by-id lookups), and the atomic remote-document import
//! transaction.

mod import;
mod migrations;
mod store;

#[cfg(test)]
mod tests;

pub use store::Storage;
