//! Per-(symbol, subaccount) trailing-stop book (spec §4.12). One mutex guards
//! the whole map — updates are O(positions) per price tick and tolerant of
//! write contention, the same granularity the pack uses for shared
//! in-memory maps updated off a market data stream.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use flow_schemas::TradeSide;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::executor::StopOrderExecutor;
use crate::types::{PositionKey, PositionState, TrailingConfig};

#[derive(Default)]
pub struct TrailingBook {
    positions: Mutex<HashMap<PositionKey, PositionState>>,
}

impl TrailingBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live position. Replaces any existing entry under `key`.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &self,
        key: PositionKey,
        side: TradeSide,
        entry_price: f64,
        size: f64,
        initial_sl_price: f64,
        initial_sl_order_id: impl Into<String>,
        config: TrailingConfig,
    ) {
        let state = PositionState::new(side, entry_price, size, initial_sl_price, initial_sl_order_id, config);
        self.positions.lock().insert(key, state);
    }

    /// Unregister on position close (spec §4.12).
    pub fn unregister(&self, key: &PositionKey) {
        self.positions.lock().remove(key);
    }

    pub fn snapshot(&self, key: &PositionKey) -> Option<PositionState> {
        self.positions.lock().get(key).cloned()
    }

    /// Drives one price tick for `key`; a no-op if the key isn't registered.
    pub fn on_price_update(&self, key: &PositionKey, price: f64, executor: &dyn StopOrderExecutor) -> Result<()> {
        let mut guard = self.positions.lock();
        let Some(state) = guard.get_mut(key) else { return Ok(()) };

        if !state.is_active {
            let crossed = match state.side {
                TradeSide::Long => price >= state.activation_price,
                TradeSide::Short => price <= state.activation_price,
            };
            if crossed {
                state.is_active = true;
                state.high_water_mark = price;
                info!(symbol = %key.symbol, subaccount = %key.subaccount, price, "trailing stop activated");
            }
            return Ok(());
        }

        let improved_hwm = match state.side {
            TradeSide::Long => price > state.high_water_mark,
            TradeSide::Short => price < state.high_water_mark,
        };
        if improved_hwm {
            state.high_water_mark = price;
        }

        let candidate = match state.side {
            TradeSide::Long => f64::max(
                state.high_water_mark * (1.0 - state.config.trail_pct),
                state.entry_price * (1.0 + state.config.breakeven_buffer_pct),
            ),
            TradeSide::Short => f64::min(
                state.high_water_mark * (1.0 + state.config.trail_pct),
                state.entry_price * (1.0 - state.config.breakeven_buffer_pct),
            ),
        };

        let improvement_pct = match state.side {
            TradeSide::Long => (candidate - state.current_sl_price) / state.current_sl_price,
            TradeSide::Short => (state.current_sl_price - candidate) / state.current_sl_price,
        };
        let is_significant = improvement_pct >= state.config.min_adjustment_pct;

        let cooldown_elapsed = match state.last_update_time {
            None => true,
            Some(last) => (Utc::now() - last).num_seconds() >= state.config.update_cooldown_sec,
        };

        if !is_significant || !cooldown_elapsed {
            return Ok(());
        }

        match executor.place_trigger_order(&key.symbol, state.side, state.size, candidate) {
            Ok(new_order_id) => {
                let old_order_id = std::mem::replace(&mut state.current_sl_order_id, new_order_id);
                state.current_sl_price = candidate;
                state.last_update_time = Some(Utc::now());
                if let Err(err) = executor.cancel_order(&key.symbol, &old_order_id) {
                    warn!(symbol = %key.symbol, %old_order_id, error = %err, "failed to cancel superseded SL order, both orders now live");
                }
            }
            Err(err) => {
                warn!(symbol = %key.symbol, error = %err, "SL replacement placement failed, previous SL retained");
            }
        }

        Ok(())
    }
}
