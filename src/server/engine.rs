//! The broadcast engine: intent dispatch, room mutation, and fan-out.
//!
//! The engine is the single logical owner of all room mutable state. Every
//! inbound frame becomes one [`ClientEvent`] consumed by [`BroadcastEngine::dispatch`],
//! which mutates the addressed room through the registry and fans the
//! resulting update out to every other connection joined to that room.
//!
//! There are no fatal errors here: membership errors (intent addressed to a
//! room or connection that is no longer registered) are dropped silently
//! because the common cause is a benign race with a concurrent teardown, and
//! malformed intents are dropped without broadcasting. The engine runs
//! indefinitely regardless of bad intents or dead connections.
//!
//! Every handler enqueues its outbound frames while still holding the lock
//! of the room it mutated. Enqueueing is non-blocking, and it makes the
//! order of frames on each recipient channel equal to the room's mutation
//! order: an observer can never see an older value after a newer one, and a
//! join snapshot can never be overtaken by a delta that preceded it.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    common::time::get_timestamp,
    domain::{ConnectionId, LeaveOutcome, Participant, Room, RoomRegistry},
};

use super::{
    presence::active_users_event,
    protocol::{ClientEvent, ServerEvent},
    pusher::{MessagePusher, PusherChannel},
};

pub struct BroadcastEngine {
    registry: RoomRegistry,
    pusher: Arc<dyn MessagePusher>,
}

impl BroadcastEngine {
    pub fn new(pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            registry: RoomRegistry::new(),
            pusher,
        }
    }

    /// The room registry, for the diagnostic HTTP endpoints.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Register a connection's outbound channel. Called once at upgrade.
    pub async fn register_connection(&self, conn_id: ConnectionId, sender: PusherChannel) {
        self.pusher.register(conn_id, sender).await;
    }

    /// Drop a connection's outbound channel. Called once after the socket
    /// closes, after [`Self::disconnect`].
    pub async fn unregister_connection(&self, conn_id: &ConnectionId) {
        self.pusher.unregister(conn_id).await;
    }

    /// Consume one intent from the tagged connection.
    pub async fn dispatch(&self, conn_id: &ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom { room_id, username } => {
                self.join(conn_id, &room_id, username).await;
            }
            ClientEvent::CodeUpdate { room_id, code, .. } => {
                self.edit_code(conn_id, &room_id, code).await;
            }
            ClientEvent::LanguageChange { room_id, language } => {
                self.change_language(conn_id, &room_id, language).await;
            }
            ClientEvent::InputUpdate { room_id, input } => {
                self.edit_input(conn_id, &room_id, input).await;
            }
            ClientEvent::OutputUpdate { room_id, output } => {
                self.publish_output(conn_id, &room_id, output).await;
            }
            ClientEvent::ChatMessage {
                room_id,
                user,
                text,
                time,
            } => {
                self.chat(conn_id, &room_id, user, text, time).await;
            }
            ClientEvent::RunCode {
                room_id,
                code,
                language,
                input,
            } => {
                self.run_code(conn_id, &room_id, code, language, input).await;
            }
            ClientEvent::LeaveRoom { room_id, .. } => {
                self.leave(conn_id, &room_id).await;
            }
        }
    }

    /// Register the participant in the room (created with empty defaults on
    /// first join), unicast the full state snapshot to the joiner, then
    /// broadcast the updated participant list to everyone in the room
    /// including the joiner.
    ///
    /// A connection occupies at most one room, so joining while still in
    /// another room first leaves it, and that room's remaining participants
    /// get the updated list.
    pub async fn join(&self, conn_id: &ConnectionId, room_id: &str, username: String) {
        tracing::info!("User '{}' ({}) joining room '{}'", username, conn_id, room_id);

        let participant = Participant::new(conn_id.clone(), username);
        let outcome = self
            .registry
            .join(room_id, participant, get_timestamp())
            .await;

        if let Some(old_room) = outcome.departed {
            tracing::info!(
                "Connection '{}' moved out of room '{}'",
                conn_id,
                old_room.id
            );
            let targets: Vec<ConnectionId> =
                old_room.participants.iter().map(|p| p.id.clone()).collect();
            self.fanout(targets, &active_users_event(&old_room.participants))
                .await;
        }

        // Snapshot before any delta: the joiner converges to the live
        // state in these three messages, then sees edits as everyone does.
        // Enqueued while the room is still locked so no racing edit can
        // slip its delta in front of the snapshot.
        let room = outcome.room;
        self.unicast(
            conn_id,
            &ServerEvent::CodeUpdate {
                room_id: room_id.to_string(),
                code: room.code.clone(),
                language: room.language,
            },
        )
        .await;
        self.unicast(
            conn_id,
            &ServerEvent::InputUpdate {
                room_id: room_id.to_string(),
                input: room.input.clone(),
            },
        )
        .await;
        self.unicast(
            conn_id,
            &ServerEvent::OutputUpdate {
                room_id: room_id.to_string(),
                output: room.output.clone(),
            },
        )
        .await;

        let everyone: Vec<ConnectionId> = room.participants.iter().map(|p| p.id.clone()).collect();
        self.fanout(everyone, &active_users_event(&room.participants))
            .await;
    }

    /// Set `Room.code` (last writer wins) and broadcast the new value to
    /// all other participants. The sender already has it locally, so it is
    /// excluded to avoid an echo round-trip.
    pub async fn edit_code(&self, conn_id: &ConnectionId, room_id: &str, code: String) {
        let Some(room) = self.member_room(conn_id, room_id).await else {
            return;
        };

        // Enqueue under the room lock: delivery order equals mutation order.
        let mut room = room.lock().await;
        room.code = code.clone();
        let targets = other_connections(&room.participants, conn_id);
        self.fanout(
            targets,
            &ServerEvent::CodeUpdate {
                room_id: room_id.to_string(),
                code,
                language: room.language,
            },
        )
        .await;
    }

    /// Set `Room.language` and broadcast to the other participants.
    pub async fn change_language(&self, conn_id: &ConnectionId, room_id: &str, language: i64) {
        let Some(room) = self.member_room(conn_id, room_id).await else {
            return;
        };

        let mut room = room.lock().await;
        room.language = language;
        let targets = other_connections(&room.participants, conn_id);
        self.fanout(
            targets,
            &ServerEvent::LanguageChange {
                room_id: room_id.to_string(),
                language,
            },
        )
        .await;
    }

    /// Set `Room.input` and broadcast to the other participants.
    pub async fn edit_input(&self, conn_id: &ConnectionId, room_id: &str, input: String) {
        let Some(room) = self.member_room(conn_id, room_id).await else {
            return;
        };

        let mut room = room.lock().await;
        room.input = input.clone();
        let targets = other_connections(&room.participants, conn_id);
        self.fanout(
            targets,
            &ServerEvent::InputUpdate {
                room_id: room_id.to_string(),
                input,
            },
        )
        .await;
    }

    /// Set `Room.output` and broadcast to the other participants. Used both
    /// for execution results and for an explicit clear: the empty string is
    /// a valid value, not a sentinel.
    pub async fn publish_output(&self, conn_id: &ConnectionId, room_id: &str, output: String) {
        let Some(room) = self.member_room(conn_id, room_id).await else {
            return;
        };

        let mut room = room.lock().await;
        room.output = output.clone();
        let targets = other_connections(&room.participants, conn_id);
        self.fanout(
            targets,
            &ServerEvent::OutputUpdate {
                room_id: room_id.to_string(),
                output,
            },
        )
        .await;
    }

    /// Relay a chat message to all other participants. Never stored in room
    /// state, never replayed to late joiners, no de-duplication.
    pub async fn chat(
        &self,
        conn_id: &ConnectionId,
        room_id: &str,
        user: String,
        text: String,
        time: String,
    ) {
        if room_id.is_empty() || user.is_empty() || text.is_empty() {
            tracing::warn!(
                "Dropping malformed chat message from '{}' (empty required field)",
                conn_id
            );
            return;
        }
        let Some(room) = self.member_room(conn_id, room_id).await else {
            return;
        };

        let room = room.lock().await;
        let targets = other_connections(&room.participants, conn_id);
        self.fanout(targets, &ServerEvent::ChatMessage { user, text, time })
            .await;
    }

    /// Opaque relay of a run request to the other participants. Execution
    /// happens via the external provider; the engine never inspects,
    /// interprets, or retries it.
    pub async fn run_code(
        &self,
        conn_id: &ConnectionId,
        room_id: &str,
        code: String,
        language: i64,
        input: String,
    ) {
        let Some(room) = self.member_room(conn_id, room_id).await else {
            return;
        };

        let room = room.lock().await;
        let targets = other_connections(&room.participants, conn_id);
        self.fanout(
            targets,
            &ServerEvent::RunCode {
                room_id: room_id.to_string(),
                code,
                language,
                input,
            },
        )
        .await;
    }

    /// Remove the participant from the room. Removes the room when it
    /// empties, otherwise announces the updated participant list to the
    /// remainder.
    pub async fn leave(&self, conn_id: &ConnectionId, room_id: &str) {
        match self.registry.leave(room_id, conn_id).await {
            Some(LeaveOutcome::RoomRemoved) => {
                tracing::info!("Room '{}' deleted (no users left)", room_id);
            }
            Some(LeaveOutcome::Remaining(room)) => {
                tracing::info!("Connection '{}' left room '{}'", conn_id, room_id);
                let targets: Vec<ConnectionId> =
                    room.participants.iter().map(|p| p.id.clone()).collect();
                self.fanout(targets, &active_users_event(&room.participants))
                    .await;
            }
            None => {
                tracing::debug!(
                    "Ignoring leave for '{}' from non-member connection '{}'",
                    room_id,
                    conn_id
                );
            }
        }
    }

    /// Transport-detected abrupt loss. Same effect as a leave, with the
    /// room resolved through the registry's reverse index.
    pub async fn disconnect(&self, conn_id: &ConnectionId) {
        match self.registry.disconnect(conn_id).await {
            Some((room_id, LeaveOutcome::RoomRemoved)) => {
                tracing::info!("Room '{}' deleted (no users left)", room_id);
            }
            Some((room_id, LeaveOutcome::Remaining(room))) => {
                tracing::info!(
                    "Connection '{}' removed from room '{}' on disconnect",
                    conn_id,
                    room_id
                );
                let targets: Vec<ConnectionId> =
                    room.participants.iter().map(|p| p.id.clone()).collect();
                self.fanout(targets, &active_users_event(&room.participants))
                    .await;
            }
            None => {
                tracing::debug!("Disconnect for '{}' matched no room", conn_id);
            }
        }
    }

    /// The room, but only if the sender is currently a member of it.
    /// Intents addressed to an unknown room or from a non-member are
    /// dropped here (benign race with a concurrent teardown).
    async fn member_room(
        &self,
        conn_id: &ConnectionId,
        room_id: &str,
    ) -> Option<Arc<Mutex<Room>>> {
        if self.registry.room_of(conn_id).await.as_deref() != Some(room_id) {
            tracing::debug!(
                "Dropping intent for room '{}' from non-member connection '{}'",
                room_id,
                conn_id
            );
            return None;
        }
        let room = self.registry.get(room_id).await;
        if room.is_none() {
            tracing::debug!("Dropping intent for vanished room '{}'", room_id);
        }
        room
    }

    async fn unicast(&self, conn_id: &ConnectionId, event: &ServerEvent) {
        let json = serde_json::to_string(event).unwrap();
        if let Err(e) = self.pusher.push_to(conn_id, &json).await {
            tracing::warn!("Failed to unicast to connection '{}': {}", conn_id, e);
        }
    }

    async fn fanout(&self, targets: Vec<ConnectionId>, event: &ServerEvent) {
        if targets.is_empty() {
            return;
        }
        let json = serde_json::to_string(event).unwrap();
        if let Err(e) = self.pusher.broadcast(targets, &json).await {
            tracing::warn!("Failed to broadcast: {}", e);
        }
    }
}

/// Broadcast targets for a delta: everyone in the room except the sender.
fn other_connections(participants: &[Participant], sender: &ConnectionId) -> Vec<ConnectionId> {
    participants
        .iter()
        .filter(|p| &p.id != sender)
        .map(|p| p.id.clone())
        .collect()
}
