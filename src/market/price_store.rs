//! In-Memory Price Store
//! Mission: Track current price and day statistics per symbol
//!
//! The store is a pure state machine: the tick scheduler is its only writer,
//! snapshot producers (broadcast + REST) only ever see owned copies. A
//! parking_lot RwLock keeps the critical sections short and cheap.

use crate::models::{PriceState, SymbolSpec};
use anyhow::{bail, Result};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;

/// Round to cents. Prices on the wire and in storage carry two decimals.
fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Strategy for drawing per-tick price deltas.
///
/// Production uses a uniform walk; tests inject scripted sequences so
/// invariants can be asserted against known inputs.
pub trait DeltaSource: Send + Sync {
    fn draw(&self, spec: &SymbolSpec) -> f64;
}

/// Uniform delta over ±volatility, the simulated market's default walk.
pub struct UniformDelta;

impl DeltaSource for UniformDelta {
    fn draw(&self, spec: &SymbolSpec) -> f64 {
        let mut rng = rand::thread_rng();
        rng.gen_range(-spec.volatility..=spec.volatility)
    }
}

/// Current prices for every allowlisted symbol.
pub struct PriceStore {
    states: RwLock<HashMap<String, PriceState>>,
    floor: f64,
}

impl PriceStore {
    pub fn new(floor: f64) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            floor,
        }
    }

    /// Seed a symbol's state. Startup only, before the first tick; seeding
    /// replaces any previous state wholesale.
    pub fn seed(&self, symbol: &str, base_price: f64) {
        let mut states = self.states.write();
        states.insert(symbol.to_string(), PriceState::seeded(round_cents(base_price)));
    }

    /// Restore a previously persisted state, preserving open/high/low.
    pub fn restore(&self, symbol: &str, state: PriceState) {
        let mut states = self.states.write();
        states.insert(symbol.to_string(), state);
    }

    /// Apply one tick's delta to a symbol and return the updated state.
    ///
    /// The new price is clamped to the configured floor so the walk can
    /// never produce a non-positive price, then high/low/change/percent are
    /// recomputed from the clamped value.
    pub fn apply_tick(&self, symbol: &str, delta: f64) -> Result<PriceState> {
        let mut states = self.states.write();
        let Some(state) = states.get_mut(symbol) else {
            bail!("symbol {} was never seeded", symbol);
        };

        let next = round_cents(state.current_price + delta).max(self.floor);
        state.current_price = next;
        state.day_high = state.day_high.max(next);
        state.day_low = state.day_low.min(next);
        state.change = round_cents(next - state.open_price);
        state.change_percent = (next - state.open_price) / state.open_price * 100.0;

        Ok(state.clone())
    }

    /// Owned copy of one symbol's state.
    pub fn get(&self, symbol: &str) -> Option<PriceState> {
        self.states.read().get(symbol).cloned()
    }

    /// Owned copy of every current state. Callers may hold or serialize this
    /// without observing later in-place mutations.
    pub fn snapshot(&self) -> HashMap<String, PriceState> {
        self.states.read().clone()
    }
}
