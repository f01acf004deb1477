//! Room synchronization and broadcast engine for a collaborative code editor.
//!
//! Several remote participants share one "room" (source code, language,
//! stdin, stdout, chat) over WebSocket connections. This library keeps every
//! participant's view of a room consistent as participants join, edit, and
//! leave concurrently: rooms are created on first join, mutated with
//! last-writer-wins semantics, fanned out to all other connections, and
//! destroyed the instant the last participant disconnects.

// layers
pub mod domain;
pub mod server;

// shared library
pub mod common;
