//! Wire protocol for the WebSocket transport.
//!
//! Every frame is a JSON object tagged by `type`, with camelCase fields.
//! [`ClientEvent`] is the single intent type consumed by the engine's
//! dispatch; [`ServerEvent`] is what the engine unicasts or fans out.
//! Both derive both serde traits so tests can drive the protocol from
//! either side without a live client.

use serde::{Deserialize, Serialize};

/// One entry of the `active-users` participant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUser {
    pub id: String,
    pub username: String,
}

/// Intent sent by a participant to read or mutate room state, or to relay
/// an ephemeral message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "join-room", rename_all = "camelCase")]
    JoinRoom { room_id: String, username: String },

    /// Edit of the shared code blob. The inbound `language` is ignored;
    /// `language-change` owns that field.
    #[serde(rename = "code-update", rename_all = "camelCase")]
    CodeUpdate {
        room_id: String,
        code: String,
        #[serde(default)]
        language: Option<i64>,
    },

    #[serde(rename = "language-change", rename_all = "camelCase")]
    LanguageChange { room_id: String, language: i64 },

    #[serde(rename = "input-update", rename_all = "camelCase")]
    InputUpdate { room_id: String, input: String },

    /// Carries both execution results and an explicit "clear output"
    /// (empty string is a valid value, not a sentinel for absence).
    #[serde(rename = "output-update", rename_all = "camelCase")]
    OutputUpdate { room_id: String, output: String },

    #[serde(rename = "chat-message", rename_all = "camelCase")]
    ChatMessage {
        room_id: String,
        user: String,
        text: String,
        time: String,
    },

    /// Opaque relay of a run request; execution happens via the external
    /// provider, never in the engine.
    #[serde(rename = "run-code", rename_all = "camelCase")]
    RunCode {
        room_id: String,
        code: String,
        language: i64,
        input: String,
    },

    #[serde(rename = "leave-room", rename_all = "camelCase")]
    LeaveRoom {
        room_id: String,
        #[serde(default)]
        username: Option<String>,
    },
}

/// State update emitted by the engine, either as a unicast snapshot to a
/// joiner or as a fan-out delta to the other participants of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "code-update", rename_all = "camelCase")]
    CodeUpdate {
        room_id: String,
        code: String,
        language: i64,
    },

    #[serde(rename = "language-change", rename_all = "camelCase")]
    LanguageChange { room_id: String, language: i64 },

    #[serde(rename = "input-update", rename_all = "camelCase")]
    InputUpdate { room_id: String, input: String },

    #[serde(rename = "output-update", rename_all = "camelCase")]
    OutputUpdate { room_id: String, output: String },

    #[serde(rename = "active-users")]
    ActiveUsers { users: Vec<ActiveUser> },

    /// Relayed chat message. The room id is dropped on the relay: the
    /// recipient's connection is already scoped to the room.
    #[serde(rename = "chat-message")]
    ChatMessage {
        user: String,
        text: String,
        time: String,
    },

    #[serde(rename = "run-code", rename_all = "camelCase")]
    RunCode {
        room_id: String,
        code: String,
        language: i64,
        input: String,
    },
}
