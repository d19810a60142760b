use std::collections::BTreeMap;

use anyhow::{bail, Result};
use flow_backtest::{run_backtest, BacktestMetrics, DEFAULT_MIN_BARS, HOLDOUT_MIN_BARS};
use flow_cache::OhlcvBar;
use flow_schemas::Timeframe;
use flow_strategy::StrategyCapability;

use crate::types::{EvaluationOutcome, EvaluatorConfig, HoldoutValidation};

/// Holdout validation (spec §4.5 step 5): decide pass/reject and the score
/// adjustment that follows from training-vs-holdout degradation.
pub fn validate_holdout(
    training_sharpe: f64,
    holdout_trades: usize,
    holdout_sharpe: f64,
    cfg: &EvaluatorConfig,
) -> HoldoutValidation {
    if training_sharpe < cfg.min_sharpe {
        return HoldoutValidation {
            passed: false,
            reason: format!("Training sharpe {training_sharpe:.4} below minimum {:.4}", cfg.min_sharpe),
            degradation: 0.0,
            holdout_bonus: 0.0,
        };
    }

    if holdout_trades == 0 {
        return HoldoutValidation {
            passed: true,
            reason: "Dormant holdout: zero trades".to_string(),
            degradation: 0.0,
            holdout_bonus: -0.30,
        };
    }

    if holdout_trades < cfg.min_holdout_trades {
        return HoldoutValidation {
            passed: true,
            reason: format!("Thin holdout sample: {holdout_trades} trades < {}", cfg.min_holdout_trades),
            degradation: 0.0,
            holdout_bonus: -0.15,
        };
    }

    let degradation = if training_sharpe == 0.0 {
        0.0
    } else {
        (training_sharpe - holdout_sharpe) / training_sharpe
    };

    if degradation > cfg.max_degradation {
        let pct = (degradation * 100.0).round() as i64;
        return HoldoutValidation {
            passed: false,
            reason: format!("Overfitted: holdout {pct}% worse"),
            degradation,
            holdout_bonus: 0.0,
        };
    }

    if holdout_sharpe < cfg.holdout_min_sharpe {
        return HoldoutValidation {
            passed: false,
            reason: format!("Holdout sharpe {holdout_sharpe:.4} below minimum {:.4}", cfg.holdout_min_sharpe),
            degradation,
            holdout_bonus: 0.0,
        };
    }

    let holdout_bonus = if degradation <= 0.0 {
        (degradation.abs() * 0.5).min(0.20)
    } else {
        -0.10 * degradation
    };

    HoldoutValidation {
        passed: true,
        reason: "Passed holdout validation".to_string(),
        degradation,
        holdout_bonus,
    }
}

/// Weighted final score (spec §4.5 step 6).
pub fn compute_final_score(training: &BacktestMetrics, holdout: &BacktestMetrics, holdout_bonus: f64, w: f64) -> f64 {
    let training_score = 0.5 * training.sharpe_ratio + 0.3 * training.expectancy + 0.2 * training.win_rate;
    let holdout_score = 0.5 * holdout.sharpe_ratio + 0.3 * holdout.expectancy + 0.2 * holdout.win_rate;
    (training_score * (1.0 - w) + holdout_score * w) * (1.0 + holdout_bonus)
}

/// Run the training/holdout evaluator end to end for one strategy/TF pair.
///
/// `training_bars` and `holdout_bars` must already be the non-overlapping
/// windows selected upstream (§4.6's coin-set selection, §3's period split).
/// Returns `Ok(None)` when the training run produced zero trades — the TF is
/// rejected before a holdout run or score is attempted.
pub fn evaluate(
    strategy: &dyn StrategyCapability,
    training_bars: &BTreeMap<String, Vec<OhlcvBar>>,
    holdout_bars: &BTreeMap<String, Vec<OhlcvBar>>,
    timeframe: Timeframe,
    max_positions: Option<usize>,
    initial_equity: f64,
    cfg: &EvaluatorConfig,
) -> Result<Option<EvaluationOutcome>> {
    let training = run_backtest(strategy, training_bars, timeframe, max_positions, DEFAULT_MIN_BARS, initial_equity)?;
    if training.total_trades == 0 {
        return Ok(None);
    }

    let holdout = run_backtest(strategy, holdout_bars, timeframe, max_positions, HOLDOUT_MIN_BARS, initial_equity)?;

    let validation = validate_holdout(training.sharpe_ratio, holdout.total_trades, holdout.sharpe_ratio, cfg);

    let final_score = if validation.passed {
        Some(compute_final_score(&training, &holdout, validation.holdout_bonus, cfg.holdout_recency_weight))
    } else {
        None
    };

    Ok(Some(EvaluationOutcome {
        holdout: validation,
        training,
        holdout_metrics: holdout,
        final_score,
    }))
}

/// Guard used by callers that need to fail loudly rather than silently skip
/// a strategy whose training run produced no trades.
pub fn require_training_trades(outcome: Option<EvaluationOutcome>) -> Result<EvaluationOutcome> {
    match outcome {
        Some(o) => Ok(o),
        None => bail!("training run produced zero trades; TF rejected"),
    }
}
