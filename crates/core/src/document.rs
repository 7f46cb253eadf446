//! Document wire model for remote synchronization.
//!
//! A [`MemoryDocument`] is the on-the-wire unit: `{id, kind, sortEpoch,
//! updatedAtEpoch, payload}`. Sessions and prompts carry natural-key ids;
//! observations and summaries are content-addressed by a SHA-256 over the
//! canonical JSON of their payload, which makes re-sends idempotent without
//! a server-assigned id.
//!
//! Payload struct field order is the canonical hash order. Do not reorder
//! fields: two replicas must serialize identical content to identical bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::record::{ObservationRecord, SessionRecord, SummaryRecord, UserPromptRecord};

/// Record kinds carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Session,
    Prompt,
    Observation,
    Summary,
}

impl DocumentKind {
    /// Returns the wire string for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Session => "session",
            Self::Prompt => "prompt",
            Self::Observation => "observation",
            Self::Summary => "summary",
        }
    }

    /// Referential application order for imports: sessions before the
    /// records that require them.
    #[must_use]
    pub const fn import_rank(&self) -> u8 {
        match *self {
            Self::Session => 0,
            Self::Prompt => 1,
            Self::Observation => 2,
            Self::Summary => 3,
        }
    }
}

/// Session document payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPayload {
    pub content_session_id: String,
    #[serde(default)]
    pub memory_session_id: Option<String>,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub custom_title: Option<String>,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub started_at_epoch: i64,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub completed_at_epoch: Option<i64>,
    #[serde(default)]
    pub status: String,
}

/// User prompt document payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptPayload {
    pub content_session_id: String,
    pub prompt_number: i64,
    #[serde(default)]
    pub prompt_text: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub created_at_epoch: i64,
}

/// Observation document payload. `discovery_tokens` is normalized to an
/// integer (missing → 0) before hashing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservationPayload {
    pub memory_session_id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "type", default)]
    pub observation_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub facts: Option<String>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub concepts: Option<String>,
    #[serde(default)]
    pub files_read: Option<String>,
    #[serde(default)]
    pub files_modified: Option<String>,
    #[serde(default)]
    pub prompt_number: Option<i64>,
    #[serde(default)]
    pub discovery_tokens: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub created_at_epoch: i64,
}

/// Summary document payload. `discovery_tokens` is normalized as for
/// observations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryPayload {
    pub memory_session_id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub investigated: Option<String>,
    #[serde(default)]
    pub learned: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub next_steps: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub files_read: Option<String>,
    #[serde(default)]
    pub files_edited: Option<String>,
    #[serde(default)]
    pub prompt_number: Option<i64>,
    #[serde(default)]
    pub discovery_tokens: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub created_at_epoch: i64,
}

/// Kind-discriminated document payload. The wire `kind` field is
/// authoritative; the in-memory representation mirrors it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum DocumentBody {
    Session(SessionPayload),
    Prompt(PromptPayload),
    Observation(ObservationPayload),
    Summary(SummaryPayload),
}

impl DocumentBody {
    /// Returns the kind discriminant of this payload.
    #[must_use]
    pub const fn kind(&self) -> DocumentKind {
        match *self {
            Self::Session(_) => DocumentKind::Session,
            Self::Prompt(_) => DocumentKind::Prompt,
            Self::Observation(_) => DocumentKind::Observation,
            Self::Summary(_) => DocumentKind::Summary,
        }
    }
}

/// The on-the-wire unit of synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDocument {
    /// Stable document identity; upserts by this id are last-writer-wins
    pub id: String,
    /// Kind tag plus kind-specific payload
    #[serde(flatten)]
    pub body: DocumentBody,
    /// Logical creation time, for ordering queries
    pub sort_epoch: i64,
    /// Cursor-advancing timestamp
    pub updated_at_epoch: i64,
}

impl MemoryDocument {
    /// Returns the kind discriminant of this document.
    #[must_use]
    pub const fn kind(&self) -> DocumentKind {
        self.body.kind()
    }
}

/// Hex SHA-256 of a value's canonical JSON serialization (struct field
/// declaration order, no whitespace).
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(hex::encode(hasher.finalize()))
}

/// Builds the document for a session with its default cursor timestamp,
/// `max(started_at_epoch, completed_at_epoch)`.
#[must_use]
pub fn session_document(session: &SessionRecord) -> MemoryDocument {
    session_document_at(session, session.updated_at_epoch())
}

/// Builds the document for a session emitted alongside a related event,
/// bumping `updatedAtEpoch` to the event's creation time so the remote
/// cursor captures secondary-field changes such as a late-arriving
/// `memory_session_id`.
#[must_use]
pub fn session_document_for_event(session: &SessionRecord, event_epoch: i64) -> MemoryDocument {
    session_document_at(session, session.updated_at_epoch().max(event_epoch))
}

fn session_document_at(session: &SessionRecord, updated_at_epoch: i64) -> MemoryDocument {
    let payload = SessionPayload {
        content_session_id: session.content_session_id.clone(),
        memory_session_id: session.memory_session_id.clone(),
        project: session.project.clone(),
        user_prompt: session.user_prompt.clone(),
        custom_title: session.custom_title.clone(),
        started_at: session.started_at.clone(),
        started_at_epoch: session.started_at_epoch,
        completed_at: session.completed_at.clone(),
        completed_at_epoch: session.completed_at_epoch,
        status: session.status.as_str().to_owned(),
    };
    MemoryDocument {
        id: format!("session:{}", session.content_session_id),
        body: DocumentBody::Session(payload),
        sort_epoch: session.started_at_epoch,
        updated_at_epoch,
    }
}

/// Builds the document for a user prompt. Prompt ids are deterministic from
/// the `(content_session_id, prompt_number)` natural key.
#[must_use]
pub fn prompt_document(prompt: &UserPromptRecord) -> MemoryDocument {
    let payload = PromptPayload {
        content_session_id: prompt.content_session_id.clone(),
        prompt_number: prompt.prompt_number,
        prompt_text: prompt.prompt_text.clone(),
        project: prompt.project.clone(),
        created_at: prompt.created_at.clone(),
        created_at_epoch: prompt.created_at_epoch,
    };
    MemoryDocument {
        id: format!("prompt:{}:{}", prompt.content_session_id, prompt.prompt_number),
        body: DocumentBody::Prompt(payload),
        sort_epoch: prompt.created_at_epoch,
        updated_at_epoch: prompt.created_at_epoch,
    }
}

/// Builds the content-addressed document for an observation.
pub fn observation_document(observation: &ObservationRecord) -> Result<MemoryDocument> {
    let payload = ObservationPayload {
        memory_session_id: observation.memory_session_id.clone(),
        project: observation.project.clone(),
        text: observation.text.clone(),
        observation_type: observation.observation_type.clone(),
        title: observation.title.clone(),
        subtitle: observation.subtitle.clone(),
        facts: observation.facts.clone(),
        narrative: observation.narrative.clone(),
        concepts: observation.concepts.clone(),
        files_read: observation.files_read.clone(),
        files_modified: observation.files_modified.clone(),
        prompt_number: observation.prompt_number,
        discovery_tokens: observation.discovery_tokens.unwrap_or(0),
        created_at: observation.created_at.clone(),
        created_at_epoch: observation.created_at_epoch,
    };
    Ok(MemoryDocument {
        id: format!("observation:{}", canonical_hash(&payload)?),
        body: DocumentBody::Observation(payload),
        sort_epoch: observation.created_at_epoch,
        updated_at_epoch: observation.created_at_epoch,
    })
}

/// Builds the content-addressed document for a session summary.
pub fn summary_document(summary: &SummaryRecord) -> Result<MemoryDocument> {
    let payload = SummaryPayload {
        memory_session_id: summary.memory_session_id.clone(),
        project: summary.project.clone(),
        request: summary.request.clone(),
        investigated: summary.investigated.clone(),
        learned: summary.learned.clone(),
        completed: summary.completed.clone(),
        next_steps: summary.next_steps.clone(),
        notes: summary.notes.clone(),
        files_read: summary.files_read.clone(),
        files_edited: summary.files_edited.clone(),
        prompt_number: summary.prompt_number,
        discovery_tokens: summary.discovery_tokens.unwrap_or(0),
        created_at: summary.created_at.clone(),
        created_at_epoch: summary.created_at_epoch,
    };
    Ok(MemoryDocument {
        id: format!("summary:{}", canonical_hash(&payload)?),
        body: DocumentBody::Summary(payload),
        sort_epoch: summary.created_at_epoch,
        updated_at_epoch: summary.created_at_epoch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SessionStatus;

    fn observation(memory: &str, tokens: Option<i64>) -> ObservationRecord {
        ObservationRecord::builder(
            "row-1".to_owned(),
            memory.to_owned(),
            "discovery".to_owned(),
        )
        .title("Found the cache layer")
        .narrative("The cache sits in front of the pool.")
        .facts(r#"["src/cache.rs holds the entry point"]"#)
        .created_at("2026-01-10T10:00:00+00:00", 1_736_503_200_000)
        .prompt_number(3)
        .discovery_tokens(tokens.unwrap_or(0))
        .build()
    }

    #[test]
    fn equal_content_yields_equal_ids() {
        let a = observation_document(&observation("m1", Some(7))).unwrap();
        let mut other = observation("m1", Some(7));
        other.id = "row-2".to_owned();
        let b = observation_document(&other).unwrap();
        // The row id does not participate in identity, only content does.
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("observation:"));
    }

    #[test]
    fn different_content_yields_different_ids() {
        let a = observation_document(&observation("m1", Some(7))).unwrap();
        let mut changed = observation("m1", Some(7));
        changed.narrative = Some("Different story.".to_owned());
        let b = observation_document(&changed).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn missing_discovery_tokens_hash_like_zero() {
        let mut missing = observation("m1", None);
        missing.discovery_tokens = None;
        let mut zero = observation("m1", None);
        zero.discovery_tokens = Some(0);
        let a = observation_document(&missing).unwrap();
        let b = observation_document(&zero).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn prompt_id_is_the_natural_key() {
        let mut prompt = UserPromptRecord::new("sess-c", 4, "hi there");
        prompt.created_at_epoch = 42;
        let doc = prompt_document(&prompt);
        assert_eq!(doc.id, "prompt:sess-c:4");
        assert_eq!(doc.updated_at_epoch, 42);
    }

    #[test]
    fn session_document_defaults_and_event_bump() {
        let mut session = SessionRecord::new("sess-c", "proj");
        session.started_at_epoch = 1_000;
        session.completed_at_epoch = Some(2_000);
        session.status = SessionStatus::Completed;

        let doc = session_document(&session);
        assert_eq!(doc.id, "session:sess-c");
        assert_eq!(doc.updated_at_epoch, 2_000);

        let bumped = session_document_for_event(&session, 9_000);
        assert_eq!(bumped.updated_at_epoch, 9_000);

        // A stale event never moves the cursor timestamp backwards.
        let stale = session_document_for_event(&session, 1_500);
        assert_eq!(stale.updated_at_epoch, 2_000);
    }

    #[test]
    fn wire_shape_uses_contract_field_names() {
        let mut session = SessionRecord::new("sess-c", "proj");
        session.started_at_epoch = 1_000;
        let json = serde_json::to_value(session_document(&session)).unwrap();
        assert_eq!(json["kind"], "session");
        assert_eq!(json["sortEpoch"], 1_000);
        assert_eq!(json["updatedAtEpoch"], 1_000);
        assert_eq!(json["payload"]["content_session_id"], "sess-c");
        assert_eq!(json["payload"]["status"], "active");

        let obs_json =
            serde_json::to_value(observation_document(&observation("m1", Some(1))).unwrap())
                .unwrap();
        assert_eq!(obs_json["kind"], "observation");
        assert_eq!(obs_json["payload"]["type"], "discovery");
    }

    #[test]
    fn documents_round_trip_through_json() {
        let doc = observation_document(&observation("m1", Some(7))).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let back: MemoryDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
        assert_eq!(back.kind(), DocumentKind::Observation);
    }

    #[test]
    fn import_rank_puts_sessions_first() {
        assert!(DocumentKind::Session.import_rank() < DocumentKind::Prompt.import_rank());
        assert!(DocumentKind::Prompt.import_rank() < DocumentKind::Observation.import_rank());
        assert!(DocumentKind::Observation.import_rank() < DocumentKind::Summary.import_rank());
    }
}
