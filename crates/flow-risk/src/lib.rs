//! flow-risk
//!
//! Risk & Leverage Validator (spec §4.10):
//! - Liquidation-safety leverage derating
//! - Fixed-fractional position sizing
//! - Signal validity checks (direction, SL/TP ordering)
//! - Global safety: portfolio drawdown + consecutive-loss advisory flags
//!
//! Deterministic, pure logic. No IO, no time, no broker calls.

mod engine;
mod types;

pub mod leverage;
pub mod signal;
pub mod sizing;

pub use engine::{evaluate, tick, validate_equity_input, validate_order_qty};
pub use leverage::{
    maintenance_margin_rate, required_liq_distance, safe_leverage, validate_and_adjust_leverage,
    DEFAULT_LIQUIDATION_BUFFER,
};
pub use signal::{validate_signal, SignalDirection, SignalValidityError};
pub use sizing::fixed_fractional_size;
pub use types::*;
