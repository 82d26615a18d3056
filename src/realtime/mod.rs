//! Realtime Module
//! Mission: Per-connection session tracking, per-user connection indexing,
//! and the websocket transport that fans ticks out to clients

pub mod registry;
pub mod ws;

pub use registry::SessionRegistry;
pub use ws::websocket_handler;
