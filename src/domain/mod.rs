//! Domain model for the room synchronization engine.
//!
//! A [`Room`] is one collaborative session's shared mutable state plus its
//! connected participant set. Rooms live only in memory and only while at
//! least one participant is connected.

mod registry;
mod room;

pub use registry::{JoinOutcome, LeaveOutcome, RoomRegistry, RoomSummary};
pub use room::{ConnectionId, DEFAULT_LANGUAGE_ID, Participant, Room};
