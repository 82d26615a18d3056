//! Database-backed Market Storage
//! Mission: Persist price state and history samples with SQLite
//!
//! Durability here is best-effort: the in-memory store and ledger stay
//! authoritative, and every caller in the periodic drivers logs and swallows
//! failures instead of propagating them.

use crate::models::{HistorySample, PriceState};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use tracing::info;

const SCHEMA_SQL: &str = r#"
-- WAL mode for concurrent reads during tick writes
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS price_info (
    symbol TEXT PRIMARY KEY,
    current_price REAL NOT NULL,
    open_price REAL NOT NULL,
    day_high REAL NOT NULL,
    day_low REAL NOT NULL,
    change REAL NOT NULL,
    change_percent REAL NOT NULL,
    updated_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS price_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    price REAL NOT NULL,
    change REAL NOT NULL,
    change_percent REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    open REAL NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_price_samples_symbol_ts
    ON price_samples(symbol, timestamp);
"#;

/// SQLite-backed store for price rows and the append-only sample log.
pub struct MarketDb {
    conn: Mutex<Connection>,
}

impl MarketDb {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize market schema")?;

        info!("📊 Market database ready at: {}", db_path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Write-through of one symbol's current state.
    pub fn upsert_price_info(
        &self,
        symbol: &str,
        state: &PriceState,
        updated_at: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO price_info
                (symbol, current_price, open_price, day_high, day_low, change, change_percent, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(symbol) DO UPDATE SET
                current_price = excluded.current_price,
                open_price = excluded.open_price,
                day_high = excluded.day_high,
                day_low = excluded.day_low,
                change = excluded.change,
                change_percent = excluded.change_percent,
                updated_at = excluded.updated_at",
            params![
                symbol,
                state.current_price,
                state.open_price,
                state.day_high,
                state.day_low,
                state.change,
                state.change_percent,
                updated_at,
            ],
        )
        .context("Failed to upsert price info")?;
        Ok(())
    }

    /// Persisted price rows, keyed by symbol. Used to reseed on restart.
    pub fn load_price_info(&self) -> Result<HashMap<String, PriceState>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT symbol, current_price, open_price, day_high, day_low, change, change_percent
             FROM price_info",
        )?;

        let rows = stmt.query_map([], |row| {
            let symbol: String = row.get(0)?;
            Ok((
                symbol,
                PriceState {
                    current_price: row.get(1)?,
                    open_price: row.get(2)?,
                    day_high: row.get(3)?,
                    day_low: row.get(4)?,
                    change: row.get(5)?,
                    change_percent: row.get(6)?,
                },
            ))
        })?;

        let mut states = HashMap::new();
        for row in rows {
            let (symbol, state) = row?;
            states.insert(symbol, state);
        }
        Ok(states)
    }

    pub fn append_price_sample(&self, sample: &HistorySample) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO price_samples
                (symbol, price, change, change_percent, high, low, open, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                sample.symbol,
                sample.price,
                sample.change,
                sample.change_percent,
                sample.high,
                sample.low,
                sample.open,
                sample.timestamp,
            ],
        )
        .context("Failed to append price sample")?;
        Ok(())
    }

    /// Samples with `timestamp >= since_ts`, ascending, at most `limit`.
    /// When more rows match, the most recent `limit` are returned.
    pub fn query_samples(
        &self,
        symbol: &str,
        since_ts: i64,
        limit: usize,
    ) -> Result<Vec<HistorySample>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT symbol, price, change, change_percent, high, low, open, timestamp
             FROM price_samples
             WHERE symbol = ?1 AND timestamp >= ?2
             ORDER BY timestamp DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![symbol, since_ts, limit as i64], |row| {
            Ok(HistorySample {
                symbol: row.get(0)?,
                price: row.get(1)?,
                change: row.get(2)?,
                change_percent: row.get(3)?,
                high: row.get(4)?,
                low: row.get(5)?,
                open: row.get(6)?,
                timestamp: row.get(7)?,
            })
        })?;

        let mut samples = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        samples.reverse(); // newest-first scan, oldest-first result
        Ok(samples)
    }

    /// Delete samples older than `cutoff_ts` across all symbols.
    pub fn delete_samples_before(&self, cutoff_ts: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute(
                "DELETE FROM price_samples WHERE timestamp < ?1",
                params![cutoff_ts],
            )
            .context("Failed to delete expired samples")?;
        Ok(deleted)
    }

    pub fn sample_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM price_samples", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Cheap reachability probe for the health endpoint.
    pub fn is_reachable(&self) -> bool {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, MarketDb) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_market.db");
        let db = MarketDb::new(path.to_str().unwrap()).unwrap();
        (dir, db)
    }

    fn sample(symbol: &str, price: f64, timestamp: i64) -> HistorySample {
        HistorySample {
            symbol: symbol.to_string(),
            price,
            change: 1.5,
            change_percent: 0.3,
            high: price + 2.0,
            low: price - 2.0,
            open: price - 1.0,
            timestamp,
        }
    }

    #[test]
    fn test_upsert_and_load_price_info() {
        let (_dir, db) = test_db();
        let state = PriceState {
            current_price: 2550.0,
            open_price: 2500.0,
            day_high: 2560.0,
            day_low: 2480.0,
            change: 50.0,
            change_percent: 2.0,
        };
        db.upsert_price_info("GOOG", &state, 1000).unwrap();

        // Second upsert overwrites the row.
        let mut updated = state.clone();
        updated.current_price = 2400.0;
        db.upsert_price_info("GOOG", &updated, 2000).unwrap();

        let loaded = db.load_price_info().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["GOOG"].current_price, 2400.0);
        assert_eq!(loaded["GOOG"].open_price, 2500.0);
    }

    #[test]
    fn test_sample_roundtrip_ordering_and_limit() {
        let (_dir, db) = test_db();
        for ts in [30, 10, 50, 20, 40] {
            db.append_price_sample(&sample("TSLA", 250.0, ts)).unwrap();
        }

        let all = db.query_samples("TSLA", 15, 500).unwrap();
        let timestamps: Vec<i64> = all.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![20, 30, 40, 50]);

        let capped = db.query_samples("TSLA", 0, 2).unwrap();
        let timestamps: Vec<i64> = capped.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![40, 50]);
    }

    #[test]
    fn test_query_is_per_symbol() {
        let (_dir, db) = test_db();
        db.append_price_sample(&sample("GOOG", 2500.0, 10)).unwrap();
        db.append_price_sample(&sample("TSLA", 250.0, 20)).unwrap();

        let result = db.query_samples("GOOG", 0, 500).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].symbol, "GOOG");
    }

    #[test]
    fn test_delete_samples_before_cutoff() {
        let (_dir, db) = test_db();
        for ts in [10, 20, 30, 40] {
            db.append_price_sample(&sample("NVDA", 900.0, ts)).unwrap();
        }

        let deleted = db.delete_samples_before(30).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.sample_count().unwrap(), 2);
        let rest = db.query_samples("NVDA", 0, 500).unwrap();
        assert!(rest.iter().all(|s| s.timestamp >= 30));
    }

    #[test]
    fn test_reachability_probe() {
        let (_dir, db) = test_db();
        assert!(db.is_reachable());
    }
}
