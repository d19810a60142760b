//! Per-strategy NEW-WORK and RE-WORK flows (spec §4.9).
//!
//! Each function here corresponds to one claimed strategy row; the
//! dispatcher (`dispatcher.rs`) is the only caller and owns claim/release.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use flow_backtest::{AdmissionCriteria, MaxLeverages};
use flow_cache::CacheReader;
use flow_eval::{scroll_down, CandidateFacts, EvaluatorConfig, ScrollDownResult};
use flow_schemas::{ParamTuple, Strategy, Timeframe};
use flow_strategy::StrategyLoader;
use sqlx::PgPool;

use crate::config::OrchestratorConfig;
use crate::pool_gateway::{self, PoolConfig};
use crate::walk_forward;

/// External facts this module cannot derive on its own: which symbols are
/// currently liquid/tradeable, ranked by the strategy kind's ordering
/// (venue volume for AI strategies, pattern edge for pattern strategies).
/// Grounded the same way `flow_eval::coinset` takes pre-looked-up facts
/// rather than reaching out to an exchange itself.
pub trait TradingUniverse: Send + Sync {
    fn ranked_candidates(&self, strategy: &Strategy) -> Vec<String>;
    fn is_actively_traded(&self, symbol: &str) -> bool;
}

/// The parametric kernel's template-supplied inputs (spec §4.4/§4.11):
/// candidate tuples and per-asset leverage caps. A template strategy
/// carries these; an AI-generated strategy's parameters are baked into its
/// code and this is `None`.
pub struct ParametricInputs {
    pub candidates: Vec<ParamTuple>,
    pub max_leverages: MaxLeverages,
    pub admission: AdmissionCriteria,
}

/// Coin-set selection thresholds (spec §4.6), paired with the scroll-down
/// target/minimum counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoinSetConfig {
    pub target_count: usize,
    pub min_count: usize,
    pub min_coverage_pct: f64,
    pub training_days: f64,
    pub holdout_days: f64,
}

fn build_candidate_facts(cache: &CacheReader, universe: &dyn TradingUniverse, strategy: &Strategy, timeframe: Timeframe) -> Vec<CandidateFacts> {
    universe
        .ranked_candidates(strategy)
        .into_iter()
        .map(|symbol| {
            let info = cache.get_cache_info(&symbol, timeframe).ok().flatten();
            CandidateFacts {
                in_active_trading_set: universe.is_actively_traded(&symbol),
                cache_file_exists: info.is_some(),
                cached_coverage_days: info.map(|i| i.covered_days as f64).unwrap_or(0.0),
                symbol,
            }
        })
        .collect()
}

/// Outcome of one NEW-WORK or RE-WORK pass. The dispatcher translates this
/// into the matching claim-layer release/mark_failed/retire call.
#[derive(Debug)]
pub enum StrategyOutcome {
    /// Admitted to (or retained in) the ACTIVE pool.
    Admitted,
    /// Rejected at some stage and RETIRED, with a human-readable reason.
    Retired { reason: String },
    /// LoaderError (spec §7): code does not parse. The row is deleted.
    LoaderFailed { reason: String },
    /// EvaluationFailure (spec §7): coin selection or the backtest engine
    /// raised. The row is marked FAILED with the reason retained.
    EvaluationFailed { reason: String },
}

/// Per-strategy NEW-WORK flow (spec §4.9): single assigned timeframe
/// (multi-TF disabled), coin selection, training+holdout evaluation, walk-
/// forward stability, scoring, and pool admission.
#[allow(clippy::too_many_arguments)]
pub async fn run_new_work(
    db: &PgPool,
    cache: &CacheReader,
    loader: &dyn StrategyLoader,
    universe: &dyn TradingUniverse,
    strategy: &Strategy,
    coinset_cfg: &CoinSetConfig,
    eval_cfg: &EvaluatorConfig,
    pool_cfg: &PoolConfig,
    orch_cfg: &OrchestratorConfig,
) -> Result<StrategyOutcome> {
    let capability = match loader.load(&strategy.name, &strategy.code) {
        Ok(c) => c,
        Err(err) => return Ok(StrategyOutcome::LoaderFailed { reason: format!("{err:#}") }),
    };

    let timeframe = strategy.timeframe;
    let facts = build_candidate_facts(cache, universe, strategy, timeframe);
    let symbols = match scroll_down(
        &facts,
        coinset_cfg.target_count,
        coinset_cfg.min_count,
        coinset_cfg.min_coverage_pct,
        coinset_cfg.training_days,
        coinset_cfg.holdout_days,
    ) {
        ScrollDownResult::Selected(symbols) => symbols,
        ScrollDownResult::Rejected { reason, passed_count } => {
            return Ok(StrategyOutcome::EvaluationFailed {
                reason: format!("coin selection failed: {} ({passed_count} passed)", reason.as_str()),
            });
        }
    };

    let (training_bars, holdout_bars) = cache.read_multi_symbol_dual_periods(
        &symbols,
        timeframe,
        coinset_cfg.training_days as i64,
        coinset_cfg.holdout_days as i64,
        None,
        coinset_cfg.min_coverage_pct,
    );

    let outcome = flow_eval::evaluate(
        capability.as_ref(),
        &training_bars,
        &holdout_bars,
        timeframe,
        orch_cfg.max_positions,
        orch_cfg.initial_equity,
        eval_cfg,
    )
    .context("training/holdout evaluation failed")?;

    let Some(outcome) = outcome else {
        return Ok(StrategyOutcome::EvaluationFailed { reason: "training run produced zero trades".to_string() });
    };

    if !outcome.holdout.passed {
        return Ok(StrategyOutcome::Retired { reason: outcome.holdout.reason });
    }

    let final_score = outcome.final_score.context("passed holdout validation without a final score")?;

    let all_bars: BTreeMap<String, _> = training_bars
        .into_iter()
        .map(|(symbol, mut bars)| {
            bars.extend(holdout_bars.get(&symbol).cloned().unwrap_or_default());
            (symbol, bars)
        })
        .collect();

    let stability = walk_forward::compute_walk_forward_stability(
        capability.as_ref(),
        &all_bars,
        timeframe,
        orch_cfg.max_positions,
        orch_cfg.initial_equity,
    )?;

    flow_db::strategies::record_backtest_outcome(
        db,
        strategy.id,
        timeframe,
        &symbols,
        final_score,
        stability.map(|s| serde_json::json!({ "walk_forward_stability": s.stability, "valid_windows": s.valid_windows })),
    )
    .await
    .context("persisting backtest outcome failed")?;

    let admission = pool_gateway::try_enter_pool(db, pool_cfg, strategy.id, final_score)
        .await
        .context("pool admission failed")?;

    match admission {
        pool_gateway::AdmissionOutcome::Admitted { .. } => Ok(StrategyOutcome::Admitted),
        pool_gateway::AdmissionOutcome::Retired { reason } => Ok(StrategyOutcome::Retired { reason }),
    }
}

/// Per-strategy RE-WORK flow: same as NEW-WORK except only the optimal TF
/// is tested, there's no parametric search, and the outcome feeds
/// `revalidate_after_retest` rather than `try_enter_pool`.
#[allow(clippy::too_many_arguments)]
pub async fn run_re_work(
    db: &PgPool,
    cache: &CacheReader,
    loader: &dyn StrategyLoader,
    universe: &dyn TradingUniverse,
    strategy: &Strategy,
    coinset_cfg: &CoinSetConfig,
    eval_cfg: &EvaluatorConfig,
    pool_cfg: &PoolConfig,
    orch_cfg: &OrchestratorConfig,
) -> Result<StrategyOutcome> {
    let capability = match loader.load(&strategy.name, &strategy.code) {
        Ok(c) => c,
        Err(err) => return Ok(StrategyOutcome::LoaderFailed { reason: format!("{err:#}") }),
    };

    let timeframe = strategy.optimal_timeframe.unwrap_or(strategy.timeframe);
    let facts = build_candidate_facts(cache, universe, strategy, timeframe);
    let symbols = match scroll_down(
        &facts,
        coinset_cfg.target_count,
        coinset_cfg.min_count,
        coinset_cfg.min_coverage_pct,
        coinset_cfg.training_days,
        coinset_cfg.holdout_days,
    ) {
        ScrollDownResult::Selected(symbols) => symbols,
        ScrollDownResult::Rejected { reason, passed_count } => {
            return Ok(StrategyOutcome::EvaluationFailed {
                reason: format!("coin selection failed: {} ({passed_count} passed)", reason.as_str()),
            });
        }
    };

    let (training_bars, holdout_bars) = cache.read_multi_symbol_dual_periods(
        &symbols,
        timeframe,
        coinset_cfg.training_days as i64,
        coinset_cfg.holdout_days as i64,
        None,
        coinset_cfg.min_coverage_pct,
    );

    let outcome = flow_eval::evaluate(
        capability.as_ref(),
        &training_bars,
        &holdout_bars,
        timeframe,
        orch_cfg.max_positions,
        orch_cfg.initial_equity,
        eval_cfg,
    )
    .context("training/holdout evaluation failed")?;

    let Some(outcome) = outcome else {
        return Ok(StrategyOutcome::EvaluationFailed { reason: "training run produced zero trades".to_string() });
    };

    if !outcome.holdout.passed {
        return Ok(StrategyOutcome::Retired { reason: outcome.holdout.reason });
    }

    let final_score = outcome.final_score.context("passed holdout validation without a final score")?;

    flow_db::strategies::record_backtest_outcome(db, strategy.id, timeframe, &symbols, final_score, None)
        .await
        .context("persisting backtest outcome failed")?;

    let admission = pool_gateway::revalidate_after_retest(db, pool_cfg, strategy.id, final_score)
        .await
        .context("pool revalidation failed")?;

    match admission {
        pool_gateway::AdmissionOutcome::Admitted { .. } => Ok(StrategyOutcome::Admitted),
        pool_gateway::AdmissionOutcome::Retired { reason } => Ok(StrategyOutcome::Retired { reason }),
    }
}

