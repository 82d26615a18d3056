//! HTTP API Module
//! Mission: REST surface for symbols, prices, history, and subscriptions

pub mod routes;

pub use routes::{create_router, AppState};
