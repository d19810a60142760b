//! flow-orchestrator
//!
//! Backtester Orchestrator (spec §4.9): the long-running process that drains
//! VALIDATED (NEW-WORK) and due-for-retest ACTIVE (RE-WORK) strategies across
//! an `N_base + 1` elastic worker pool, evaluates each against cached OHLCV
//! bars, and hands the result to the Pool Manager.

pub mod config;
pub mod dispatcher;
pub mod pipeline;
pub mod pool_gateway;
pub mod walk_forward;

pub use config::OrchestratorConfig;
pub use dispatcher::{run, Deps};
pub use pipeline::{CoinSetConfig, ParametricInputs, StrategyOutcome, TradingUniverse};
pub use pool_gateway::PoolConfig;
pub use walk_forward::{compute_walk_forward_stability, WalkForwardResult};
