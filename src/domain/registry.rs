//! In-memory room registry.
//!
//! The registry owns the only globally shared structure in the system: the
//! room-id to room mapping, plus a reverse index from connection id to the
//! room it currently occupies (disconnect cleanup is O(1) instead of a scan
//! over every room).
//!
//! Membership mutations (create-on-first-join, delete-on-last-leave) run
//! under the map lock, so concurrent joins and leaves for the same room id
//! can never double-create or prematurely delete a room. Field edits only
//! take the per-room lock, so different rooms proceed fully in parallel.
//!
//! Membership operations return the affected room's guard still held. The
//! caller enqueues the resulting announcements before dropping it, so the
//! enqueue order on every recipient channel equals the mutation order.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::room::{ConnectionId, Participant, Room};

/// Result of a join. `room` is the joined room, still locked; the join
/// snapshot must be enqueued before the guard drops so a racing edit cannot
/// slip its delta in between.
pub struct JoinOutcome {
    pub room: OwnedMutexGuard<Room>,
    /// A different room this connection previously occupied and has now
    /// left. Present only when that room survives the departure; its
    /// remaining participants still need a presence announcement.
    pub departed: Option<OwnedMutexGuard<Room>>,
}

/// Result of a leave that found the participant.
pub enum LeaveOutcome {
    /// Participants remain. The guard is still held so the presence update
    /// can be enqueued in mutation order.
    Remaining(OwnedMutexGuard<Room>),
    /// The participant set emptied and the room was removed.
    RoomRemoved,
}

/// Read-only view of one room for the diagnostic endpoints.
#[derive(Debug, Clone)]
pub struct RoomSummary {
    pub id: String,
    pub participants: Vec<Participant>,
    pub language: i64,
    pub created_at: i64,
}

/// Registry of active rooms, created lazily and destroyed when empty.
///
/// Lock order is always rooms map, then the reverse index, then a room.
#[derive(Default)]
pub struct RoomRegistry {
    /// Map of room id to its room. A room is present iff its participant
    /// set is non-empty.
    rooms: Mutex<HashMap<String, Arc<Mutex<Room>>>>,
    /// Reverse index: connection id to the room it is currently joined to.
    /// A connection is a member of at most one room at a time.
    memberships: Mutex<HashMap<ConnectionId, String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `participant` in the room, creating the room with empty
    /// defaults if it does not exist. Re-join by the same connection id
    /// replaces the prior entry.
    ///
    /// A connection occupies at most one room: joining while the reverse
    /// index maps the connection to a different room first applies a leave
    /// to that room, surfaced through [`JoinOutcome::departed`].
    pub async fn join(&self, room_id: &str, participant: Participant, now: i64) -> JoinOutcome {
        let mut rooms = self.rooms.lock().await;
        let mut memberships = self.memberships.lock().await;
        let conn_id = participant.id.clone();

        let mut departed = None;
        let previous = memberships.get(&conn_id).cloned();
        if let Some(prev_id) = previous.filter(|prev_id| prev_id.as_str() != room_id) {
            let prev_entry = rooms.get(&prev_id).cloned();
            if let Some(entry) = prev_entry {
                let mut prev_room = entry.lock_owned().await;
                if prev_room.remove_participant(&conn_id).is_some() {
                    if prev_room.is_empty() {
                        drop(prev_room);
                        rooms.remove(&prev_id);
                        tracing::info!("Room '{}' deleted (no users left)", prev_id);
                    } else {
                        departed = Some(prev_room);
                    }
                }
            }
        }

        let entry = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::new(room_id.to_string(), now))))
            .clone();
        let mut room = entry.lock_owned().await;
        room.upsert_participant(participant);
        memberships.insert(conn_id, room_id.to_string());

        JoinOutcome { room, departed }
    }

    /// Remove the participant from the room. The room is removed from the
    /// registry the instant its participant set becomes empty.
    ///
    /// Returns `None` when the room did not exist or the connection was not
    /// a member (a benign race with a concurrent teardown; idempotent under
    /// duplicate delivery).
    pub async fn leave(&self, room_id: &str, conn_id: &ConnectionId) -> Option<LeaveOutcome> {
        let mut rooms = self.rooms.lock().await;
        let mut memberships = self.memberships.lock().await;

        let entry = rooms.get(room_id)?.clone();
        let mut room = entry.lock_owned().await;
        room.remove_participant(conn_id)?;

        // Drop the index entry only if it still points at this room; a
        // stale leave must not erase the connection's current membership.
        if memberships.get(conn_id).map(String::as_str) == Some(room_id) {
            memberships.remove(conn_id);
        }

        if room.is_empty() {
            drop(room);
            rooms.remove(room_id);
            Some(LeaveOutcome::RoomRemoved)
        } else {
            Some(LeaveOutcome::Remaining(room))
        }
    }

    /// Transport-detected abrupt loss: resolve the connection's room via
    /// the reverse index and apply the same effect as a leave.
    ///
    /// Returns the room id and the leave outcome, or `None` when the
    /// connection was not joined to any room.
    pub async fn disconnect(&self, conn_id: &ConnectionId) -> Option<(String, LeaveOutcome)> {
        let room_id = {
            let memberships = self.memberships.lock().await;
            memberships.get(conn_id).cloned()?
        };
        let outcome = self.leave(&room_id, conn_id).await?;
        Some((room_id, outcome))
    }

    /// Look up a room for a field edit. `None` means the room was already
    /// torn down by a racing leave; the caller drops the edit.
    pub async fn get(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).cloned()
    }

    /// The room a connection is currently joined to, if any.
    pub async fn room_of(&self, conn_id: &ConnectionId) -> Option<String> {
        let memberships = self.memberships.lock().await;
        memberships.get(conn_id).cloned()
    }

    /// Ids of all currently active rooms.
    pub async fn room_ids(&self) -> Vec<String> {
        let rooms = self.rooms.lock().await;
        rooms.keys().cloned().collect()
    }

    /// Summaries of all currently active rooms, for the diagnostic API.
    pub async fn summaries(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.lock().await;
        let mut summaries = Vec::with_capacity(rooms.len());
        for entry in rooms.values() {
            let room = entry.lock().await;
            summaries.push(RoomSummary {
                id: room.id.clone(),
                participants: room.participants.clone(),
                language: room.language,
                created_at: room.created_at,
            });
        }
        // Sort by room id for consistent ordering
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Summary of one room, or `None` if it is not active.
    pub async fn summary(&self, room_id: &str) -> Option<RoomSummary> {
        let entry = self.get(room_id).await?;
        let room = entry.lock().await;
        Some(RoomSummary {
            id: room.id.clone(),
            participants: room.participants.clone(),
            language: room.language,
            created_at: room.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_LANGUAGE_ID;

    fn participant(id: &str, username: &str) -> Participant {
        Participant::new(ConnectionId::new(id.to_string()), username.to_string())
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id.to_string())
    }

    #[tokio::test]
    async fn test_join_creates_room_with_empty_defaults() {
        // given (precondition):
        let registry = RoomRegistry::new();

        // when (operation):
        let outcome = registry.join("r1", participant("c1", "alice"), 1000).await;

        // then (expected result):
        assert_eq!(outcome.room.code, "");
        assert_eq!(outcome.room.language, DEFAULT_LANGUAGE_ID);
        assert_eq!(outcome.room.input, "");
        assert_eq!(outcome.room.output, "");
        assert_eq!(outcome.room.participants.len(), 1);
        assert!(outcome.departed.is_none());
        assert_eq!(registry.room_ids().await, vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn test_join_existing_room_returns_live_state() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;
        {
            let room = registry.get("r1").await.unwrap();
            let mut room = room.lock().await;
            room.code = "print(1)".to_string();
            room.language = 71;
        }

        // when (operation): a late joiner arrives
        let outcome = registry.join("r1", participant("c2", "bob"), 2000).await;

        // then (expected result): the joiner sees the live state
        assert_eq!(outcome.room.code, "print(1)");
        assert_eq!(outcome.room.language, 71);
        assert_eq!(outcome.room.participants.len(), 2);
        assert_eq!(outcome.room.participants[0].username, "alice");
        assert_eq!(outcome.room.participants[1].username, "bob");
    }

    #[tokio::test]
    async fn test_rejoin_same_connection_replaces_entry() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;

        // when (operation):
        let outcome = registry.join("r1", participant("c1", "alice2"), 2000).await;

        // then (expected result): no duplicate entries, no departure
        assert_eq!(outcome.room.participants.len(), 1);
        assert_eq!(outcome.room.participants[0].username, "alice2");
        assert!(outcome.departed.is_none());
    }

    #[tokio::test]
    async fn test_join_elsewhere_leaves_previous_room() {
        // given (precondition): c1 alone in r1
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;

        // when (operation): the same connection joins r2
        let outcome = registry.join("r2", participant("c1", "alice"), 2000).await;

        // then (expected result): r1 emptied and is gone, index points at r2
        assert!(outcome.departed.is_none());
        drop(outcome);
        assert_eq!(registry.room_ids().await, vec!["r2".to_string()]);
        assert_eq!(registry.room_of(&conn("c1")).await.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_join_elsewhere_reports_surviving_previous_room() {
        // given (precondition): c1 and c2 in r1
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;
        registry.join("r1", participant("c2", "bob"), 1000).await;

        // when (operation): c1 moves to r2
        let outcome = registry.join("r2", participant("c1", "alice"), 2000).await;

        // then (expected result): r1 survives with bob and is surfaced so
        // its remaining participants can be notified
        let departed = outcome.departed.as_ref().expect("previous room should survive");
        assert_eq!(departed.id, "r1");
        assert_eq!(departed.participants.len(), 1);
        assert_eq!(departed.participants[0].username, "bob");
        drop(outcome);

        let room = registry.get("r1").await.unwrap();
        let room = room.lock().await;
        assert_eq!(room.participants.len(), 1);
        assert_eq!(room.participants[0].username, "bob");
    }

    #[tokio::test]
    async fn test_disconnect_after_switching_rooms_removes_all_rooms() {
        // given (precondition): c1 joined r1, then r2
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;
        registry.join("r2", participant("c1", "alice"), 2000).await;

        // when (operation):
        let result = registry.disconnect(&conn("c1")).await;

        // then (expected result): both rooms are gone, not just r2
        assert!(matches!(result, Some((room_id, LeaveOutcome::RoomRemoved)) if room_id == "r2"));
        assert!(registry.room_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_leave_keeps_current_membership() {
        // given (precondition): c1 joined r1, then moved to r2
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;
        registry.join("r2", participant("c1", "alice"), 2000).await;

        // when (operation): a late leave for the old room arrives
        let stale = registry.leave("r1", &conn("c1")).await;

        // then (expected result): it is a noop and the r2 membership
        // survives, so disconnect still tears r2 down
        assert!(stale.is_none());
        assert_eq!(registry.room_of(&conn("c1")).await.as_deref(), Some("r2"));
        registry.disconnect(&conn("c1")).await;
        assert!(registry.room_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_removes_empty_room() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;

        // when (operation):
        let outcome = registry.leave("r1", &conn("c1")).await;

        // then (expected result): the room is gone the instant it empties
        assert!(matches!(outcome, Some(LeaveOutcome::RoomRemoved)));
        assert!(registry.get("r1").await.is_none());
        assert!(registry.room_ids().await.is_empty());
        assert!(registry.room_of(&conn("c1")).await.is_none());
    }

    #[tokio::test]
    async fn test_leave_keeps_room_with_remaining_participants() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;
        registry.join("r1", participant("c2", "bob"), 2000).await;

        // when (operation):
        let outcome = registry.leave("r1", &conn("c1")).await;

        // then (expected result):
        match outcome {
            Some(LeaveOutcome::Remaining(room)) => {
                assert_eq!(room.participants.len(), 1);
                assert_eq!(room.participants[0].username, "bob");
            }
            _ => panic!("room should survive with bob remaining"),
        }
        assert!(registry.get("r1").await.is_some());
    }

    #[tokio::test]
    async fn test_leave_unknown_room_is_a_noop() {
        // given (precondition):
        let registry = RoomRegistry::new();

        // when (operation):
        let outcome = registry.leave("ghost", &conn("c1")).await;

        // then (expected result):
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_leave_by_non_member_is_a_noop() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;

        // when (operation):
        let outcome = registry.leave("r1", &conn("c9")).await;

        // then (expected result): the room and its member are untouched
        assert!(outcome.is_none());
        assert!(registry.get("r1").await.is_some());
    }

    #[tokio::test]
    async fn test_disconnect_resolves_room_via_reverse_index() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;
        registry.join("r1", participant("c2", "bob"), 2000).await;

        // when (operation):
        let result = registry.disconnect(&conn("c1")).await;

        // then (expected result):
        let (room_id, outcome) = result.unwrap();
        assert_eq!(room_id, "r1");
        match outcome {
            LeaveOutcome::Remaining(room) => {
                assert_eq!(room.participants.len(), 1);
                assert_eq!(room.participants[0].username, "bob");
            }
            LeaveOutcome::RoomRemoved => panic!("room should survive with bob remaining"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_unknown_connection_is_a_noop() {
        // given (precondition):
        let registry = RoomRegistry::new();

        // when (operation):
        let result = registry.disconnect(&conn("c1")).await;

        // then (expected result):
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;
        registry.disconnect(&conn("c1")).await;

        // when (operation): duplicate disconnect for the same connection
        let result = registry.disconnect(&conn("c1")).await;

        // then (expected result):
        assert!(result.is_none());
        assert!(registry.room_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_room_present_iff_participants_remain() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("r1", participant("c1", "alice"), 1000).await;
        registry.join("r1", participant("c2", "bob"), 2000).await;

        // when (operation) / then (expected result): no ghost rooms, no
        // missing rooms while members remain
        registry.leave("r1", &conn("c1")).await;
        assert!(registry.get("r1").await.is_some());
        registry.leave("r1", &conn("c2")).await;
        assert!(registry.get("r1").await.is_none());
    }

    #[tokio::test]
    async fn test_summaries_sorted_by_room_id() {
        // given (precondition):
        let registry = RoomRegistry::new();
        registry.join("zebra", participant("c1", "alice"), 1000).await;
        registry.join("apple", participant("c2", "bob"), 2000).await;

        // when (operation):
        let summaries = registry.summaries().await;

        // then (expected result):
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "apple");
        assert_eq!(summaries[1].id, "zebra");
        assert_eq!(summaries[0].created_at, 2000);
    }
}
