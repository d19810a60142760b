/// Worker layout and backpressure thresholds (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Workers permanently reserved for NEW-WORK. Total parallelism is
    /// `n_base_workers + 1` (the elastic worker).
    pub n_base_workers: usize,
    /// A strategy's `status=ACTIVE` row is due for RE-WORK once
    /// `last_backtested_at` is older than this.
    pub retest_interval_days: i64,
    /// Downstream backpressure: sleep when `count(status=ACTIVE) >= pool_max_size`.
    pub pool_max_size: i64,
    pub backpressure_base_secs: f64,
    pub backpressure_increment_secs: f64,
    pub backpressure_max_secs: f64,
    /// Per-strategy initial equity fed to the backtest/walk-forward engine.
    pub initial_equity: f64,
    /// Bounded-concurrent-position cap fed to `run_backtest` (§4.3).
    pub max_positions: Option<usize>,
}

impl OrchestratorConfig {
    pub fn sane_defaults() -> Self {
        Self {
            n_base_workers: 4,
            retest_interval_days: 7,
            pool_max_size: 300,
            backpressure_base_secs: 1.0,
            backpressure_increment_secs: 0.5,
            backpressure_max_secs: 60.0,
            initial_equity: 10_000.0,
            max_positions: None,
        }
    }

    /// Total concurrent worker slots: `N_base + 1` elastic.
    pub fn total_workers(&self) -> usize {
        self.n_base_workers + 1
    }
}
