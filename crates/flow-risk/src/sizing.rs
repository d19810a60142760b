//! Fixed-fractional position sizing (spec §4.10).
//!
//! An earlier maximum-notional cap was removed deliberately: fixed-fractional
//! sizing already bounds loss per trade to `risk_per_trade_pct` of balance.

/// `size = (balance * risk_per_trade_pct) / |entry - sl_price|`.
///
/// Returns `None` when `entry == sl_price` (sizing is undefined — the stop
/// carries no distance to risk against) or when any input is non-finite.
pub fn fixed_fractional_size(balance: f64, risk_per_trade_pct: f64, entry: f64, sl_price: f64) -> Option<f64> {
    if !balance.is_finite() || !risk_per_trade_pct.is_finite() || !entry.is_finite() || !sl_price.is_finite() {
        return None;
    }
    let distance = (entry - sl_price).abs();
    if distance == 0.0 {
        return None;
    }
    let risk_dollars = balance * risk_per_trade_pct;
    Some(risk_dollars / distance)
}
