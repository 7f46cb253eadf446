//! Core types for agent-mem
//!
//! Domain records for conversational memory (sessions, user prompts,
//! observations, session summaries), the document wire model used for
//! remote synchronization, and the shared error type.

mod document;
mod error;
mod record;

pub use document::*;
pub use error::*;
pub use record::*;
