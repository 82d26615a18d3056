//! Periodic Market Drivers
//! Mission: Tick the price walk every second and sweep expired history hourly
//!
//! Both drivers wrap their bodies in failure boundaries: a failed persist or
//! a single bad symbol is logged and swallowed, the loop always reaches its
//! next interval, and in-memory state stays authoritative.

use crate::{
    market::{history::QUERY_LIMIT_CAP, DeltaSource, HistoryLedger, PriceStore},
    models::{HistorySample, WsServerEvent, SUPPORTED_SYMBOLS},
    storage::MarketDb,
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::interval};
use tracing::{debug, info, warn};

/// Everything the periodic drivers touch, shared with the API layer.
#[derive(Clone)]
pub struct MarketState {
    pub store: Arc<PriceStore>,
    pub ledger: Arc<HistoryLedger>,
    pub db: Arc<MarketDb>,
    pub deltas: Arc<dyn DeltaSource>,
    pub price_tx: broadcast::Sender<WsServerEvent>,
}

impl MarketState {
    /// Seed every allowlisted symbol, preferring persisted rows so a restart
    /// resumes the walk instead of resetting it.
    pub fn seed_prices(&self) {
        let persisted = match self.db.load_price_info() {
            Ok(rows) => rows,
            Err(e) => {
                warn!("⚠️  Could not load persisted prices, seeding fresh: {}", e);
                Default::default()
            }
        };

        for spec in SUPPORTED_SYMBOLS {
            match persisted.get(spec.symbol) {
                Some(state) => {
                    debug!("Restoring {} at {}", spec.symbol, state.current_price);
                    self.store.restore(spec.symbol, state.clone());
                }
                None => self.store.seed(spec.symbol, spec.base_price),
            }
        }
        info!("💹 Seeded {} symbols", SUPPORTED_SYMBOLS.len());
    }

    /// Serve a history range, falling back to the in-memory ledger when
    /// durable storage is unavailable.
    pub fn history(&self, symbol: &str, since_ts: i64, limit: usize) -> Vec<HistorySample> {
        let limit = limit.min(QUERY_LIMIT_CAP);
        match self.db.query_samples(symbol, since_ts, limit) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("⚠️  Storage query failed, serving in-memory history: {}", e);
                self.ledger.query(symbol, since_ts, limit)
            }
        }
    }
}

/// One full tick: mutate every symbol, append history, persist best-effort,
/// then broadcast a single whole-allowlist snapshot.
///
/// The snapshot goes to every connected client, authenticated or not; topic
/// membership does not filter the payload.
pub fn run_tick(state: &MarketState, now_ms: i64) {
    for spec in SUPPORTED_SYMBOLS {
        let delta = state.deltas.draw(&spec);
        let updated = match state.store.apply_tick(spec.symbol, delta) {
            Ok(updated) => updated,
            Err(e) => {
                // One bad symbol must not stop the rest of the tick.
                warn!("⚠️  Tick skipped for {}: {}", spec.symbol, e);
                continue;
            }
        };

        let sample = HistorySample::from_state(spec.symbol, &updated, now_ms);
        state.ledger.append(sample.clone());

        if let Err(e) = state.db.upsert_price_info(spec.symbol, &updated, now_ms) {
            warn!("⚠️  Failed to persist price for {}: {}", spec.symbol, e);
        }
        if let Err(e) = state.db.append_price_sample(&sample) {
            warn!("⚠️  Failed to persist sample for {}: {}", spec.symbol, e);
        }
    }

    // Send errors just mean nobody is listening right now.
    let _ = state.price_tx.send(WsServerEvent::PriceUpdate {
        prices: state.store.snapshot(),
        timestamp: now_ms,
    });
}

/// One retention pass over the ledger and durable storage.
pub fn run_retention_sweep(state: &MarketState, cutoff_ms: i64) {
    let removed = state.ledger.prune(cutoff_ms);
    if removed > 0 {
        info!("🧹 Pruned {} in-memory samples older than cutoff", removed);
    }

    match state.db.delete_samples_before(cutoff_ms) {
        Ok(deleted) if deleted > 0 => {
            info!("🧹 Deleted {} persisted samples older than cutoff", deleted);
        }
        Ok(_) => {}
        Err(e) => {
            // A failed sweep leaves extra data for the next attempt.
            warn!("⚠️  Retention sweep persistence failed (non-critical): {}", e);
        }
    }
}

/// Fixed-interval tick driver.
pub async fn tick_polling(state: MarketState, tick_interval_ms: u64) {
    info!(
        "⏱️  Starting price tick scheduler ({}ms interval, {} symbols)",
        tick_interval_ms,
        SUPPORTED_SYMBOLS.len()
    );

    let mut ticker = interval(Duration::from_millis(tick_interval_ms));
    loop {
        ticker.tick().await;
        run_tick(&state, Utc::now().timestamp_millis());
    }
}

/// Slow retention driver. Cutoff is recomputed each pass.
pub async fn retention_sweep_polling(
    state: MarketState,
    sweep_secs: u64,
    retention_hours: i64,
) {
    info!(
        "🧹 Starting retention sweeper (every {}s, {}h window)",
        sweep_secs, retention_hours
    );

    let mut ticker = interval(Duration::from_secs(sweep_secs));
    loop {
        ticker.tick().await;
        let cutoff = Utc::now().timestamp_millis() - retention_hours * 3_600_000;
        run_retention_sweep(&state, cutoff);
    }
}
