//! Durable Storage Module
//! Mission: Best-effort SQLite persistence of prices and history samples

pub mod db;

pub use db::MarketDb;
