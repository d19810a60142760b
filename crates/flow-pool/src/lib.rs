//! flow-pool
//!
//! Pool Manager / leaderboard (§4.8): admits, evicts, and retires strategies
//! from the ACTIVE trading pool by `score_backtest`, capped at `max_size`.
//!
//! Pure logic over an in-memory leaderboard — the caller (flow-db) owns the
//! transaction that makes an admission/eviction pair observed atomically.

pub mod pool;
pub mod types;

pub use pool::{revalidate_after_retest, try_enter_pool, ActivePool};
pub use types::{AdmissionOutcome, PoolConfig, PoolMember};
