//! flow-backtest
//!
//! Backtest Engine (§4.3) and Parametric Kernel (§4.4): replay one
//! strategy's entry signals against OHLCV history under a shared-capital,
//! bounded-concurrent-position portfolio model.
//!
//! - Deterministic replay: same bars + params => identical trades
//! - First-touch SL/TP/time-exit simulation, SL wins on ambiguous bars
//! - The kernel evaluates many parameter tuples off one indicator pass

pub mod engine;
pub mod exits;
pub mod kernel;
pub mod metrics;

pub use engine::{run_backtest, DEFAULT_MIN_BARS, HOLDOUT_MIN_BARS};
pub use exits::{simulate_first_touch_exit, ExitOutcome};
pub use kernel::{evaluate_parameter_space, AdmissionCriteria, MaxLeverages, TupleResult};
pub use metrics::{compute_metrics, BacktestMetrics, TradeResult};
