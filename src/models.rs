use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::{format_timestamp, Micros};

/// The one record kind the reconciler applies patches to.
pub const NOTE_ENTITY_TYPE: &str = "note";

/// Fields every new note starts with before its first patch is applied.
pub const NOTE_DEFAULT_FIELDS: [&str; 2] = ["title", "content"];

/// Schema-free note payload. Ordered so serialized snapshots are stable.
pub type Fields = BTreeMap<String, String>;

/// Operation recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Upsert,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Upsert => "upsert",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upsert" => Some(Op::Upsert),
            _ => None,
        }
    }
}

/// Current-value state of a note.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub fields: Fields,
    pub version: i64,
    pub updated_at: Micros,
}

impl Note {
    pub fn snapshot(&self) -> NoteSnapshot {
        NoteSnapshot {
            id: self.id.clone(),
            fields: self.fields.clone(),
            version: self.version,
            updated_at: format_timestamp(self.updated_at),
        }
    }

    /// Latest-state change record for the sync feed. The version and data are
    /// the note's current ones, not those of the event that pointed here.
    pub fn to_change(&self, event: &Event) -> ChangeRecord {
        ChangeRecord {
            entity_type: event.entity_type.clone(),
            id: self.id.clone(),
            op: event.op,
            version: self.version,
            updated_at: format_timestamp(self.updated_at),
            data: self.fields.clone(),
        }
    }
}

/// Wire form of a note: fields are flattened next to the bookkeeping keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
    pub version: i64,
    pub updated_at: String,
}

/// An immutable entry in the append-only event log.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Insertion order; breaks ties between equal timestamps.
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub op: Op,
    pub version: i64,
    pub updated_at: Micros,
}

/// One entry of a sync response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
    pub op: Op,
    pub version: i64,
    pub updated_at: String,
    pub data: Fields,
}

/// Body of POST /api/mutations.
#[derive(Debug, Clone, Deserialize)]
pub struct MutationRequest {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub patch: Fields,
    pub base_version: i64,
    /// Client outbox bookkeeping, accepted and ignored.
    #[serde(default)]
    pub intent_type: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub retries: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    BaseVersionStale,
}

/// Result of reconciling one mutation. This is what gets stored verbatim
/// under the idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationOutcome {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<NoteSnapshot>,
    },
    Conflict {
        reason: ConflictReason,
        server_version: i64,
    },
}

impl MutationOutcome {
    pub fn applied(note: &Note) -> Self {
        MutationOutcome::Ok {
            entity: Some(note.snapshot()),
        }
    }

    pub fn stale(server_version: i64) -> Self {
        MutationOutcome::Conflict {
            reason: ConflictReason::BaseVersionStale,
            server_version,
        }
    }

    /// Outcome for entity kinds the reconciler does not handle.
    pub fn ignored() -> Self {
        MutationOutcome::Ok { entity: None }
    }
}

/// Response for GET /api/sync.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub changes: Vec<ChangeRecord>,
    pub next_cursor: String,
}

/// Query parameters for GET /api/sync.
#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Query parameters for GET /api/notes.
#[derive(Debug, Deserialize)]
pub struct ListNotesQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

/// Response for GET /api/notes.
#[derive(Debug, Serialize)]
pub struct ListNotesResponse {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub notes: Vec<NoteSnapshot>,
}
