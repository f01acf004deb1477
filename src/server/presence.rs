//! Presence projection.
//!
//! The `active-users` list a client renders is a pure projection of a
//! room's participant set, recomputed and broadcast on every membership
//! change. There is no independent presence state.

use crate::domain::Participant;

use super::protocol::{ActiveUser, ServerEvent};

/// Project a room's participants into the wire-level user list, preserving
/// join order.
pub fn build_active_users(participants: &[Participant]) -> Vec<ActiveUser> {
    participants
        .iter()
        .map(|p| ActiveUser {
            id: p.id.as_str().to_string(),
            username: p.username.clone(),
        })
        .collect()
}

/// The `active-users` event announcing the current membership of a room.
pub fn active_users_event(participants: &[Participant]) -> ServerEvent {
    ServerEvent::ActiveUsers {
        users: build_active_users(participants),
    }
}
