//! Shared Data Models
//! Mission: Define the symbol allowlist, price state, and wire formats

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tradable symbol from the fixed allowlist, with display metadata and the
/// parameters of its simulated random walk.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SymbolSpec {
    pub symbol: &'static str,
    pub name: &'static str,
    /// Seed price used when no persisted price row exists.
    pub base_price: f64,
    /// Half-range of the per-tick uniform delta.
    pub volatility: f64,
}

/// The fixed symbol allowlist. Known at startup, never extended at runtime.
pub static SUPPORTED_SYMBOLS: [SymbolSpec; 5] = [
    SymbolSpec {
        symbol: "GOOG",
        name: "Alphabet Inc.",
        base_price: 2500.0,
        volatility: 5.0,
    },
    SymbolSpec {
        symbol: "TSLA",
        name: "Tesla, Inc.",
        base_price: 250.0,
        volatility: 5.0,
    },
    SymbolSpec {
        symbol: "AMZN",
        name: "Amazon.com, Inc.",
        base_price: 180.0,
        volatility: 5.0,
    },
    SymbolSpec {
        symbol: "META",
        name: "Meta Platforms, Inc.",
        base_price: 480.0,
        volatility: 5.0,
    },
    SymbolSpec {
        symbol: "NVDA",
        name: "NVIDIA Corporation",
        base_price: 900.0,
        volatility: 5.0,
    },
];

/// Check a client-supplied symbol against the allowlist.
pub fn is_supported_symbol(symbol: &str) -> bool {
    SUPPORTED_SYMBOLS.iter().any(|s| s.symbol == symbol)
}

/// Look up the spec for an allowlisted symbol.
pub fn symbol_spec(symbol: &str) -> Option<&'static SymbolSpec> {
    SUPPORTED_SYMBOLS.iter().find(|s| s.symbol == symbol)
}

/// Current price and derived day statistics for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceState {
    pub current_price: f64,
    pub open_price: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub change: f64,
    pub change_percent: f64,
}

impl PriceState {
    /// Seed state: every field equals the base price, change is zero.
    pub fn seeded(base_price: f64) -> Self {
        Self {
            current_price: base_price,
            open_price: base_price,
            day_high: base_price,
            day_low: base_price,
            change: 0.0,
            change_percent: 0.0,
        }
    }
}

/// One immutable price sample, appended per symbol per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySample {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    /// Unix millis.
    pub timestamp: i64,
}

impl HistorySample {
    pub fn from_state(symbol: &str, state: &PriceState, timestamp: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: state.current_price,
            change: state.change,
            change_percent: state.change_percent,
            high: state.day_high,
            low: state.day_low,
            open: state.open_price,
            timestamp,
        }
    }
}

/// Events pushed to websocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum WsServerEvent {
    Authenticated {
        user_id: String,
    },
    AuthError {
        reason: String,
    },
    PriceUpdate {
        prices: HashMap<String, PriceState>,
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
}

/// Events received from websocket clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsClientEvent {
    Authenticate { token: String },
    Subscribe { symbol: String },
    Unsubscribe { symbol: String },
    Ping { timestamp: Option<i64> },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub jwt_secret: String,
    pub tick_interval_ms: u64,
    pub retention_sweep_secs: u64,
    pub history_retention_hours: i64,
    pub price_floor: f64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DB_PATH").unwrap_or_else(|_| "./tickstream.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5000);

        let jwt_secret =
            std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".to_string());

        let tick_interval_ms = std::env::var("TICK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(1000);

        let retention_sweep_secs = std::env::var("RETENTION_SWEEP_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(3600);

        let history_retention_hours = std::env::var("HISTORY_RETENTION_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(24);

        let price_floor = std::env::var("PRICE_FLOOR")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|&v| v > 0.0)
            .unwrap_or(10.0);

        Self {
            database_path,
            port,
            jwt_secret,
            tick_interval_ms,
            retention_sweep_secs,
            history_retention_hours,
            price_floor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_membership() {
        assert!(is_supported_symbol("GOOG"));
        assert!(is_supported_symbol("NVDA"));
        assert!(!is_supported_symbol("AAPL"));
        assert!(!is_supported_symbol(""));
    }

    #[test]
    fn test_symbol_specs_have_positive_bases() {
        for spec in SUPPORTED_SYMBOLS {
            assert!(spec.base_price > 0.0, "{} base must be positive", spec.symbol);
            assert!(spec.volatility > 0.0);
        }
    }

    #[test]
    fn test_ws_event_wire_shape() {
        let event = WsServerEvent::AuthError {
            reason: "Invalid token".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "auth-error");
        assert_eq!(json["data"]["reason"], "Invalid token");

        let client: WsClientEvent =
            serde_json::from_str(r#"{"type":"subscribe","symbol":"TSLA"}"#).unwrap();
        match client {
            WsClientEvent::Subscribe { symbol } => assert_eq!(symbol, "TSLA"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
