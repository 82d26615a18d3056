//! Market Simulation Module
//! Mission: Own the in-memory price state machine, the bounded history
//! ledger, and the periodic drivers that mutate and broadcast them

pub mod history;
pub mod price_store;
pub mod scheduler;

pub use history::HistoryLedger;
pub use price_store::{DeltaSource, PriceStore, UniformDelta};
pub use scheduler::{
    retention_sweep_polling, run_retention_sweep, run_tick, tick_polling, MarketState,
};
