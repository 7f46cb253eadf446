//! Local record types for conversational memory.
//!
//! Timestamps are stored as a wall-clock RFC 3339 string paired with an
//! explicit epoch-milliseconds integer; both travel on the wire.

use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Current wall-clock time as an (RFC 3339 string, epoch ms) pair.
#[must_use]
pub fn now_pair() -> (String, i64) {
    let now = Utc::now();
    (now.to_rfc3339(), now.timestamp_millis())
}

/// Session status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SessionStatus {
    /// Session is active
    Active,
    /// Session failed
    Failed,
    /// Session completed successfully
    Completed,
}

impl SessionStatus {
    /// Returns the string representation of the session status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    /// Merge priority: an incoming status wins when its priority is at
    /// least the current one (`active < failed < completed`).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match *self {
            Self::Active => 0,
            Self::Failed => 1,
            Self::Completed => 2,
        }
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "failed" => Ok(Self::Failed),
            "completed" => Ok(Self::Completed),
            other => Err(Error::InvalidInput(format!("unknown session status: {other}"))),
        }
    }
}

/// A memory session tracking one conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct SessionRecord {
    /// Primary stable identity, known at first capture
    pub content_session_id: String,
    /// Secondary identity assigned later; unique when present
    pub memory_session_id: Option<String>,
    /// Project name or path
    pub project: String,
    /// Initial user prompt
    pub user_prompt: Option<String>,
    /// User-assigned title
    pub custom_title: Option<String>,
    /// Session start time (wall clock)
    pub started_at: String,
    /// Session start time (epoch ms)
    pub started_at_epoch: i64,
    /// Session end time (wall clock)
    pub completed_at: Option<String>,
    /// Session end time (epoch ms)
    pub completed_at_epoch: Option<i64>,
    /// Current session status
    pub status: SessionStatus,
}

impl SessionRecord {
    /// Creates a new active session started now.
    #[must_use]
    pub fn new(content_session_id: impl Into<String>, project: impl Into<String>) -> Self {
        let (started_at, started_at_epoch) = now_pair();
        Self {
            content_session_id: content_session_id.into(),
            memory_session_id: None,
            project: project.into(),
            user_prompt: None,
            custom_title: None,
            started_at,
            started_at_epoch,
            completed_at: None,
            completed_at_epoch: None,
            status: SessionStatus::Active,
        }
    }

    /// Epoch that advances the remote cursor for this session by default.
    #[must_use]
    pub fn updated_at_epoch(&self) -> i64 {
        self.started_at_epoch.max(self.completed_at_epoch.unwrap_or(0))
    }
}

/// User prompt within a session, unique by `(content_session_id, prompt_number)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct UserPromptRecord {
    /// Row identifier
    pub id: String,
    /// Owning session's primary identity
    pub content_session_id: String,
    /// Prompt number in session
    pub prompt_number: i64,
    /// Prompt text content
    pub prompt_text: String,
    /// Derived from the owning session when read; not stored on the row
    pub project: String,
    /// When prompt was created (wall clock)
    pub created_at: String,
    /// When prompt was created (epoch ms)
    pub created_at_epoch: i64,
}

impl UserPromptRecord {
    /// Creates a new prompt created now, with a fresh row id.
    #[must_use]
    pub fn new(
        content_session_id: impl Into<String>,
        prompt_number: i64,
        prompt_text: impl Into<String>,
    ) -> Self {
        let (created_at, created_at_epoch) = now_pair();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_session_id: content_session_id.into(),
            prompt_number,
            prompt_text: prompt_text.into(),
            project: String::new(),
            created_at,
            created_at_epoch,
        }
    }
}

/// Structured observation captured during a session, tied to it by
/// `memory_session_id`.
///
/// `facts`, `concepts`, `files_read` and `files_modified` are stringified
/// JSON and opaque at this layer: never parsed, never rewritten, equal
/// byte-for-byte or not at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct ObservationRecord {
    /// Row identifier
    pub id: String,
    /// Owning session's secondary identity
    pub memory_session_id: String,
    /// Derived from the owning session when read; not stored on the row
    pub project: String,
    /// Free-form body text
    pub text: Option<String>,
    /// Observation type tag (free string so foreign replicas cannot poison a batch)
    pub observation_type: String,
    /// Concise title
    pub title: Option<String>,
    /// One-line context
    pub subtitle: Option<String>,
    /// Specific facts learned, stringified JSON
    pub facts: Option<String>,
    /// 2-3 sentence explanation of what happened
    pub narrative: Option<String>,
    /// Semantic concepts, stringified JSON
    pub concepts: Option<String>,
    /// File paths read, stringified JSON
    pub files_read: Option<String>,
    /// File paths modified, stringified JSON
    pub files_modified: Option<String>,
    /// Prompt number within session
    pub prompt_number: Option<i64>,
    /// Token count for ROI tracking
    pub discovery_tokens: Option<i64>,
    /// When this observation was created (wall clock)
    pub created_at: String,
    /// When this observation was created (epoch ms)
    pub created_at_epoch: i64,
}

impl ObservationRecord {
    /// Returns a new builder with the required fields set.
    #[must_use]
    pub fn builder(
        id: String,
        memory_session_id: String,
        observation_type: String,
    ) -> ObservationRecordBuilder {
        ObservationRecordBuilder::new(id, memory_session_id, observation_type)
    }
}

/// Builder for constructing [`ObservationRecord`] instances.
#[derive(Debug, Clone)]
pub struct ObservationRecordBuilder {
    record: ObservationRecord,
}

impl ObservationRecordBuilder {
    fn new(id: String, memory_session_id: String, observation_type: String) -> Self {
        let (created_at, created_at_epoch) = now_pair();
        Self {
            record: ObservationRecord {
                id,
                memory_session_id,
                project: String::new(),
                text: None,
                observation_type,
                title: None,
                subtitle: None,
                facts: None,
                narrative: None,
                concepts: None,
                files_read: None,
                files_modified: None,
                prompt_number: None,
                discovery_tokens: None,
                created_at,
                created_at_epoch,
            },
        }
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.record.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.record.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn maybe_title(mut self, title: Option<String>) -> Self {
        self.record.title = title;
        self
    }

    #[must_use]
    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.record.subtitle = Some(subtitle.into());
        self
    }

    #[must_use]
    pub fn facts(mut self, facts: impl Into<String>) -> Self {
        self.record.facts = Some(facts.into());
        self
    }

    #[must_use]
    pub fn narrative(mut self, narrative: impl Into<String>) -> Self {
        self.record.narrative = Some(narrative.into());
        self
    }

    #[must_use]
    pub fn maybe_narrative(mut self, narrative: Option<String>) -> Self {
        self.record.narrative = narrative;
        self
    }

    #[must_use]
    pub fn concepts(mut self, concepts: impl Into<String>) -> Self {
        self.record.concepts = Some(concepts.into());
        self
    }

    #[must_use]
    pub fn files_read(mut self, files_read: impl Into<String>) -> Self {
        self.record.files_read = Some(files_read.into());
        self
    }

    #[must_use]
    pub fn files_modified(mut self, files_modified: impl Into<String>) -> Self {
        self.record.files_modified = Some(files_modified.into());
        self
    }

    #[must_use]
    pub fn prompt_number(mut self, prompt_number: i64) -> Self {
        self.record.prompt_number = Some(prompt_number);
        self
    }

    #[must_use]
    pub fn discovery_tokens(mut self, discovery_tokens: i64) -> Self {
        self.record.discovery_tokens = Some(discovery_tokens);
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: impl Into<String>, created_at_epoch: i64) -> Self {
        self.record.created_at = created_at.into();
        self.record.created_at_epoch = created_at_epoch;
        self
    }

    #[must_use]
    pub fn build(self) -> ObservationRecord {
        self.record
    }
}

/// Summary of one prompt of a session, tied to it by `memory_session_id`.
///
/// File lists are stringified JSON, opaque at this layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[non_exhaustive]
pub struct SummaryRecord {
    /// Row identifier
    pub id: String,
    /// Owning session's secondary identity
    pub memory_session_id: String,
    /// Derived from the owning session when read; not stored on the row
    pub project: String,
    /// What was requested
    pub request: Option<String>,
    /// What was investigated
    pub investigated: Option<String>,
    /// What was learned
    pub learned: Option<String>,
    /// What was completed
    pub completed: Option<String>,
    /// Next steps
    pub next_steps: Option<String>,
    /// Additional notes
    pub notes: Option<String>,
    /// Files that were read, stringified JSON
    pub files_read: Option<String>,
    /// Files that were edited, stringified JSON
    pub files_edited: Option<String>,
    /// Prompt number this summary covers
    pub prompt_number: Option<i64>,
    /// Discovery tokens used
    pub discovery_tokens: Option<i64>,
    /// When summary was created (wall clock)
    pub created_at: String,
    /// When summary was created (epoch ms)
    pub created_at_epoch: i64,
}

impl SummaryRecord {
    /// Returns a new builder with the required fields set.
    #[must_use]
    pub fn builder(id: String, memory_session_id: String) -> SummaryRecordBuilder {
        SummaryRecordBuilder::new(id, memory_session_id)
    }
}

/// Builder for constructing [`SummaryRecord`] instances.
#[derive(Debug, Clone)]
pub struct SummaryRecordBuilder {
    record: SummaryRecord,
}

impl SummaryRecordBuilder {
    fn new(id: String, memory_session_id: String) -> Self {
        let (created_at, created_at_epoch) = now_pair();
        Self {
            record: SummaryRecord {
                id,
                memory_session_id,
                project: String::new(),
                request: None,
                investigated: None,
                learned: None,
                completed: None,
                next_steps: None,
                notes: None,
                files_read: None,
                files_edited: None,
                prompt_number: None,
                discovery_tokens: None,
                created_at,
                created_at_epoch,
            },
        }
    }

    #[must_use]
    pub fn request(mut self, request: impl Into<String>) -> Self {
        self.record.request = Some(request.into());
        self
    }

    #[must_use]
    pub fn investigated(mut self, investigated: impl Into<String>) -> Self {
        self.record.investigated = Some(investigated.into());
        self
    }

    #[must_use]
    pub fn learned(mut self, learned: impl Into<String>) -> Self {
        self.record.learned = Some(learned.into());
        self
    }

    #[must_use]
    pub fn completed(mut self, completed: impl Into<String>) -> Self {
        self.record.completed = Some(completed.into());
        self
    }

    #[must_use]
    pub fn next_steps(mut self, next_steps: impl Into<String>) -> Self {
        self.record.next_steps = Some(next_steps.into());
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.record.notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn files_read(mut self, files_read: impl Into<String>) -> Self {
        self.record.files_read = Some(files_read.into());
        self
    }

    #[must_use]
    pub fn files_edited(mut self, files_edited: impl Into<String>) -> Self {
        self.record.files_edited = Some(files_edited.into());
        self
    }

    #[must_use]
    pub fn prompt_number(mut self, prompt_number: i64) -> Self {
        self.record.prompt_number = Some(prompt_number);
        self
    }

    #[must_use]
    pub fn discovery_tokens(mut self, discovery_tokens: i64) -> Self {
        self.record.discovery_tokens = Some(discovery_tokens);
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: impl Into<String>, created_at_epoch: i64) -> Self {
        self.record.created_at = created_at.into();
        self.record.created_at_epoch = created_at_epoch;
        self
    }

    #[must_use]
    pub fn build(self) -> SummaryRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [SessionStatus::Active, SessionStatus::Failed, SessionStatus::Completed] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn status_priority_orders_merge_winners() {
        assert!(SessionStatus::Active.priority() < SessionStatus::Failed.priority());
        assert!(SessionStatus::Failed.priority() < SessionStatus::Completed.priority());
    }

    #[test]
    fn session_updated_epoch_takes_later_of_start_and_completion() {
        let mut session = SessionRecord::new("c1", "proj");
        session.started_at_epoch = 1_000;
        assert_eq!(session.updated_at_epoch(), 1_000);

        session.completed_at_epoch = Some(2_500);
        assert_eq!(session.updated_at_epoch(), 2_500);

        session.completed_at_epoch = Some(500);
        assert_eq!(session.updated_at_epoch(), 1_000);
    }

    #[test]
    fn prompt_gets_fresh_row_id() {
        let a = UserPromptRecord::new("c1", 1, "hello");
        let b = UserPromptRecord::new("c1", 2, "world");
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_session_id, b.content_session_id);
    }
}
