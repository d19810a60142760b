use uuid::Uuid;

/// Pool Manager thresholds (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub max_size: usize,
    pub min_score_entry: f64,
}

impl PoolConfig {
    pub fn sane_defaults() -> Self {
        Self { max_size: 300, min_score_entry: 50.0 }
    }
}

/// One row of the ACTIVE-pool leaderboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolMember {
    pub strategy_id: Uuid,
    pub score_backtest: f64,
}

/// Outcome of `try_enter_pool` / `revalidate_after_retest`.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionOutcome {
    /// Candidate is now ACTIVE. `evicted` names the strategy retired to make
    /// room, if any.
    Admitted { evicted: Option<Uuid> },
    /// Candidate (or re-tested incumbent) is RETIRED, with the reason string
    /// the spec's seed scenarios surface verbatim.
    Retired { reason: String },
}
