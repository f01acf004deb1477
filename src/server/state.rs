//! Shared application state.

use crate::server::engine::BroadcastEngine;

/// State shared across all handlers via axum's `State` extractor.
pub struct AppState {
    /// Single owner of all room mutable state.
    pub engine: BroadcastEngine,
}
