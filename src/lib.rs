//! Tickstream Backend Library
//!
//! Realtime price distribution: a fixed allowlist of symbols walks on a
//! one-second tick, every live websocket connection receives the full
//! snapshot, and a bounded in-memory ledger backed by SQLite answers
//! historical range queries.

pub mod api;
pub mod auth;
pub mod market;
pub mod models;
pub mod realtime;
pub mod storage;
