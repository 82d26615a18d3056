//! In-Memory History Ledger
//! Mission: Bounded, append-only price samples per symbol for range queries
//!
//! Samples arrive once per tick in timestamp order, so each per-symbol deque
//! is always sorted ascending. The retention sweeper prunes the front.

use crate::models::HistorySample;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Hard cap on the number of samples any single query returns.
pub const QUERY_LIMIT_CAP: usize = 500;

/// Append-only, time-bounded samples partitioned by symbol.
pub struct HistoryLedger {
    samples: Mutex<HashMap<String, VecDeque<HistorySample>>>,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(HashMap::new()),
        }
    }

    /// Append one sample. O(1); the ledger grows unbounded between sweeps.
    pub fn append(&self, sample: HistorySample) {
        let mut samples = self.samples.lock();
        samples
            .entry(sample.symbol.clone())
            .or_default()
            .push_back(sample);
    }

    /// Samples with `timestamp >= since_ts`, ascending, at most `limit`.
    ///
    /// When more samples match than `limit` allows, the most recent `limit`
    /// are kept (still oldest-first), so a capped day query returns the tail
    /// of the window rather than its head.
    pub fn query(&self, symbol: &str, since_ts: i64, limit: usize) -> Vec<HistorySample> {
        let limit = limit.min(QUERY_LIMIT_CAP);
        let samples = self.samples.lock();
        let Some(deque) = samples.get(symbol) else {
            return Vec::new();
        };

        // Deques are sorted ascending, so everything from the first match on
        // is in-window.
        let start = deque.partition_point(|s| s.timestamp < since_ts);
        let matched = deque.len() - start;
        let skip = matched.saturating_sub(limit);
        deque.iter().skip(start + skip).cloned().collect()
    }

    /// Drop samples older than `cutoff_ts`. Returns the number removed.
    ///
    /// Pruning re-acquires the lock per symbol so a long sweep never starves
    /// concurrent appends and queries for more than one symbol's pass.
    pub fn prune(&self, cutoff_ts: i64) -> usize {
        let symbols: Vec<String> = self.samples.lock().keys().cloned().collect();

        let mut removed = 0;
        for symbol in symbols {
            let mut samples = self.samples.lock();
            if let Some(deque) = samples.get_mut(&symbol) {
                while deque.front().is_some_and(|s| s.timestamp < cutoff_ts) {
                    deque.pop_front();
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Total samples currently retained across all symbols.
    pub fn len(&self) -> usize {
        self.samples.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(symbol: &str, price: f64, timestamp: i64) -> HistorySample {
        HistorySample {
            symbol: symbol.to_string(),
            price,
            change: 0.0,
            change_percent: 0.0,
            high: price,
            low: price,
            open: price,
            timestamp,
        }
    }

    #[test]
    fn test_query_orders_and_filters() {
        let ledger = HistoryLedger::new();
        for ts in [10, 20, 30, 40, 50] {
            ledger.append(sample("GOOG", 100.0, ts));
        }

        let result = ledger.query("GOOG", 25, 500);
        let timestamps: Vec<i64> = result.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![30, 40, 50]);
    }

    #[test]
    fn test_query_unknown_symbol_is_empty() {
        let ledger = HistoryLedger::new();
        assert!(ledger.query("TSLA", 0, 500).is_empty());
    }

    #[test]
    fn test_query_keeps_most_recent_when_capped() {
        let ledger = HistoryLedger::new();
        for ts in 0..10 {
            ledger.append(sample("GOOG", 100.0, ts));
        }

        let result = ledger.query("GOOG", 0, 3);
        let timestamps: Vec<i64> = result.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![7, 8, 9]);
    }

    #[test]
    fn test_query_limit_is_capped_at_500() {
        let ledger = HistoryLedger::new();
        for ts in 0..600 {
            ledger.append(sample("GOOG", 100.0, ts));
        }
        assert_eq!(ledger.query("GOOG", 0, usize::MAX).len(), 500);
    }

    #[test]
    fn test_day_window_over_two_days_of_samples() {
        // 600 samples spanning 2 days, one every 4.8 minutes.
        let ledger = HistoryLedger::new();
        let day_ms = 24 * 3600 * 1000;
        let now = 2 * day_ms;
        let step = 2 * day_ms / 600;
        for i in 0..600 {
            ledger.append(sample("GOOG", 100.0, i * step));
        }

        let result = ledger.query("GOOG", now - day_ms, 500);
        assert!(result.len() <= 500);
        assert!(result.iter().all(|s| s.timestamp >= now - day_ms));
        assert!(result.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        // The in-window samples are the second half of the appends.
        assert_eq!(result.len(), 300);
        assert_eq!(result.last().unwrap().timestamp, 599 * step);
    }

    #[test]
    fn test_prune_removes_only_older_samples() {
        let ledger = HistoryLedger::new();
        for ts in [10, 20, 30] {
            ledger.append(sample("GOOG", 100.0, ts));
            ledger.append(sample("TSLA", 200.0, ts));
        }

        let removed = ledger.prune(25);
        assert_eq!(removed, 4);
        for symbol in ["GOOG", "TSLA"] {
            let rest = ledger.query(symbol, 0, 500);
            assert!(rest.iter().all(|s| s.timestamp >= 25));
            assert_eq!(rest.len(), 1);
        }
    }

    #[test]
    fn test_prune_is_idempotent() {
        let ledger = HistoryLedger::new();
        ledger.append(sample("GOOG", 100.0, 10));
        assert_eq!(ledger.prune(100), 1);
        assert_eq!(ledger.prune(100), 0);
        assert!(ledger.is_empty());
    }
}
