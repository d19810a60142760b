use flow_backtest::BacktestMetrics;

/// Thresholds governing the training/holdout anti-overfit gate (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatorConfig {
    /// Training Sharpe below this rejects the TF outright.
    pub min_sharpe: f64,
    /// Holdout Sharpe below this rejects as overfit (after degradation passes).
    pub holdout_min_sharpe: f64,
    /// `degradation` above this rejects as overfit. Spec default 0.50.
    pub max_degradation: f64,
    /// Below this many holdout trades (but > 0), apply the thin-sample penalty.
    pub min_holdout_trades: usize,
    /// Blend weight `w` of holdout vs training in the final score. Spec default 0.6.
    pub holdout_recency_weight: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            min_sharpe: 0.0,
            holdout_min_sharpe: 0.0,
            max_degradation: 0.50,
            min_holdout_trades: 20,
            holdout_recency_weight: 0.6,
        }
    }
}

/// Outcome of the holdout validation step (spec §4.5 step 5).
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutValidation {
    pub passed: bool,
    pub reason: String,
    pub degradation: f64,
    pub holdout_bonus: f64,
}

/// The evaluator's full decision for one strategy/TF pair.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub holdout: HoldoutValidation,
    pub training: BacktestMetrics,
    pub holdout_metrics: BacktestMetrics,
    /// `None` when the gate rejected the TF before a score was computed.
    pub final_score: Option<f64>,
}
