use chrono::{DateTime, Utc};
use flow_schemas::TradeSide;

/// Identifies one live position the trailing service tracks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionKey {
    pub symbol: String,
    pub subaccount: String,
}

impl PositionKey {
    pub fn new(symbol: impl Into<String>, subaccount: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            subaccount: subaccount.into(),
        }
    }
}

/// Per-position trailing parameters (spec §4.12), supplied at registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingConfig {
    pub activation_pct: f64,
    pub trail_pct: f64,
    pub breakeven_buffer_pct: f64,
    pub min_adjustment_pct: f64,
    pub update_cooldown_sec: i64,
}

/// One live position's dormant→active trailing-stop state.
#[derive(Debug, Clone)]
pub struct PositionState {
    pub side: TradeSide,
    pub entry_price: f64,
    pub activation_price: f64,
    pub high_water_mark: f64,
    pub current_sl_price: f64,
    pub current_sl_order_id: String,
    pub size: f64,
    pub is_active: bool,
    pub config: TrailingConfig,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl PositionState {
    /// A new dormant position. `activation_price` is entry offset by
    /// `activation_pct` in the favorable direction; the SL is not touched
    /// until activation.
    pub fn new(
        side: TradeSide,
        entry_price: f64,
        size: f64,
        initial_sl_price: f64,
        initial_sl_order_id: impl Into<String>,
        config: TrailingConfig,
    ) -> Self {
        let activation_price = match side {
            TradeSide::Long => entry_price * (1.0 + config.activation_pct),
            TradeSide::Short => entry_price * (1.0 - config.activation_pct),
        };
        Self {
            side,
            entry_price,
            activation_price,
            high_water_mark: entry_price,
            current_sl_price: initial_sl_price,
            current_sl_order_id: initial_sl_order_id.into(),
            size,
            is_active: false,
            config,
            last_update_time: None,
        }
    }
}
