//! Room and participant entities.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Language identifier assigned to a room that has never seen a
/// `language-change`. Also the value to fall back to wherever a language
/// field must be defaulted; there is exactly one default policy.
pub const DEFAULT_LANGUAGE_ID: i64 = 54;

/// Identity of one live connection, assigned by the transport layer at
/// upgrade time and never reused while that connection is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh connection id (uuid v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live connection's identity within a room.
///
/// `username` is user-supplied: not unique, not authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ConnectionId,
    pub username: String,
}

impl Participant {
    pub fn new(id: ConnectionId, username: String) -> Self {
        Self { id, username }
    }
}

/// One collaborative session's shared mutable state.
///
/// Each of `code`, `language`, `input`, `output` is a single
/// last-writer-wins value: the most recent accepted mutation from any
/// participant fully replaces the prior value, with no merge. Participants
/// are kept in join order.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub participants: Vec<Participant>,
    pub code: String,
    pub language: i64,
    pub input: String,
    pub output: String,
    /// Unix timestamp (UTC, milliseconds) of the first join that created
    /// this room. Diagnostic only.
    pub created_at: i64,
}

impl Room {
    /// Create an empty room with default state
    pub fn new(id: String, created_at: i64) -> Self {
        Self {
            id,
            participants: Vec::new(),
            code: String::new(),
            language: DEFAULT_LANGUAGE_ID,
            input: String::new(),
            output: String::new(),
            created_at,
        }
    }

    /// Add a participant, replacing any prior entry with the same
    /// connection id in place (re-join never duplicates).
    pub fn upsert_participant(&mut self, participant: Participant) {
        match self.participants.iter_mut().find(|p| p.id == participant.id) {
            Some(existing) => *existing = participant,
            None => self.participants.push(participant),
        }
    }

    /// Remove a participant by connection id. Returns the removed entry,
    /// or `None` if the connection was not a member.
    pub fn remove_participant(&mut self, conn_id: &ConnectionId) -> Option<Participant> {
        let index = self.participants.iter().position(|p| &p.id == conn_id)?;
        Some(self.participants.remove(index))
    }

    pub fn contains(&self, conn_id: &ConnectionId) -> bool {
        self.participants.iter().any(|p| &p.id == conn_id)
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
