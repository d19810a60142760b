use flow_schemas::TradeSide;

/// Per-asset metadata loaded at startup (spec §4.13): drives size and price
/// rounding and leverage ceilings independent of the venue's own quirks.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetMetadata {
    pub symbol: String,
    pub sz_decimals: u32,
    pub max_leverage: u32,
}

impl AssetMetadata {
    /// Round a raw size down to `sz_decimals` so a venue never rejects an
    /// order for over-precision.
    pub fn round_size(&self, raw: f64) -> f64 {
        let factor = 10f64.powi(self.sz_decimals as i32);
        (raw * factor).floor() / factor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

/// Order-placement result. `dry_run_` prefixed ids never touched a live venue
/// (spec §4.13's dry-run contract).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
}

impl OrderAck {
    pub fn is_dry_run(&self) -> bool {
        self.order_id.starts_with("dry_run_")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: TradeSide,
    pub size: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountBalance {
    pub equity: f64,
    pub available_margin: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unreachable,
}
