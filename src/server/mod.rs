//! Room synchronization server: broadcast engine, wire protocol, and the
//! axum WebSocket transport around them.

pub mod engine;
pub mod presence;
pub mod protocol;
pub mod pusher;

mod handler;
mod runner;
mod signal;
mod state;

pub use runner::{app, build_state, run_server};
pub use state::AppState;
