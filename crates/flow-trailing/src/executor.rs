use anyhow::Result;
use flow_schemas::TradeSide;

/// The narrow slice of the venue adapter (spec §4.13) the trailing service
/// needs: place the replacement trigger order before cancelling the old one,
/// so a failed placement never leaves a position unprotected.
pub trait StopOrderExecutor: Send + Sync {
    fn place_trigger_order(&self, symbol: &str, side: TradeSide, size: f64, trigger_price: f64) -> Result<String>;
    fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;
}
