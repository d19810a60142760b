//! Periodic maintenance sweep (spec §4.K): stale-claim reaping, a queue-depth
//! metrics snapshot, and live-rollup refresh for LIVE strategies.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use flow_backtest::{compute_metrics, TradeResult};
use flow_cache::CacheReader;
use flow_db::{claim, metrics, results, strategies, trades};
use flow_eval::{score_from_trades, LiveScoreError, LiveScorerConfig};
use flow_schemas::{PipelineMetricsSnapshot, StrategyStatus};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;

const QUEUE_STATUSES: [StrategyStatus; 6] = [
    StrategyStatus::Generated,
    StrategyStatus::Validated,
    StrategyStatus::Active,
    StrategyStatus::Live,
    StrategyStatus::Retired,
    StrategyStatus::Failed,
];

/// Reclaim leases abandoned by a crashed worker (spec §5).
pub async fn reap_stale_claims(db: &PgPool, cfg: &SchedulerConfig) -> Result<u64> {
    let reaped = claim::reap_stale_claims(db, cfg.stale_threshold_secs).await?;
    if reaped > 0 {
        info!(reaped, "reclaimed stale claims");
    }
    Ok(reaped)
}

/// Capture a `PipelineMetricsSnapshot`: one row per status plus pool
/// utilization against `cfg.pool_max_size`.
pub async fn snapshot_metrics(db: &PgPool, cfg: &SchedulerConfig) -> Result<PipelineMetricsSnapshot> {
    let mut queue_depths = BTreeMap::new();
    let mut active_count = 0i64;
    for status in QUEUE_STATUSES {
        let n = strategies::count_by_status(db, status).await?;
        if status == StrategyStatus::Active {
            active_count = n;
        }
        queue_depths.insert(status.as_str().to_string(), n);
    }

    let pool_utilization = if cfg.pool_max_size > 0 {
        active_count as f64 / cfg.pool_max_size as f64
    } else {
        0.0
    };

    let snapshot = PipelineMetricsSnapshot {
        id: Uuid::new_v4(),
        captured_at: Utc::now(),
        queue_depths,
        pool_utilization,
    };
    metrics::insert(db, &snapshot).await?;
    Ok(snapshot)
}

/// Log cached symbols with no bars for any timeframe — a cold cache that
/// would starve the orchestrator's loader.
pub fn check_cache_freshness(cache: &CacheReader) -> Result<()> {
    let symbols = cache.list_cached_symbols(None).context("list_cached_symbols failed")?;
    for symbol in &symbols {
        let timeframes = cache.list_cached_timeframes(symbol)?;
        if timeframes.is_empty() {
            warn!(symbol, "cached symbol has no bars for any timeframe");
        }
    }
    Ok(())
}

/// Recompute a LIVE strategy's rollup from its closed trades (spec §4.7's
/// `LiveScorer`). Degradation is training-vs-live Sharpe, mirroring the
/// holdout-vs-training formula the Evaluator uses at promotion time.
async fn refresh_live_rollup(db: &PgPool, strategy_id: Uuid, scorer_cfg: &LiveScorerConfig) -> Result<()> {
    let closed = trades::list_for_strategy(db, strategy_id).await?;
    if closed.is_empty() {
        return Ok(());
    }

    let training_sharpe = results::list_for_strategy(db, strategy_id)
        .await?
        .into_iter()
        .max_by_key(|r| r.end_date)
        .map(|r| r.sharpe_ratio)
        .unwrap_or(0.0);

    let trade_results: Vec<TradeResult> = closed
        .iter()
        .map(|t| TradeResult {
            symbol: t.symbol.clone(),
            entry_time: t.entry_time,
            exit_time: t.exit_time,
            pct_return: t.pnl_pct,
        })
        .collect();
    let span_days = (closed.iter().map(|t| t.exit_time).max().unwrap() - closed.iter().map(|t| t.entry_time).min().unwrap())
        .num_seconds() as f64
        / 86_400.0;
    let live_metrics = compute_metrics(&trade_results, 1.0, span_days.max(1.0));

    let live_sharpe = live_metrics.sharpe_ratio;
    let degradation = if training_sharpe == 0.0 {
        0.0
    } else {
        (training_sharpe - live_sharpe) / training_sharpe
    };

    let score_live = match score_from_trades(&closed, degradation, scorer_cfg) {
        Ok(score) => score,
        Err(LiveScoreError::InsufficientTrades | LiveScoreError::InsufficientFrequencyData) => 0.0,
    };

    let total_pnl_live = closed.iter().map(|t| t.pnl_usd).sum();

    strategies::update_live_rollup(
        db,
        strategy_id,
        score_live,
        live_metrics.win_rate,
        live_metrics.expectancy,
        live_sharpe,
        live_metrics.max_drawdown,
        live_metrics.total_trades as i64,
        total_pnl_live,
        degradation,
    )
    .await
    .context("update_live_rollup failed")?;

    Ok(())
}

/// Refresh every LIVE strategy's rollup.
pub async fn refresh_all_live_rollups(db: &PgPool, scorer_cfg: &LiveScorerConfig) -> Result<()> {
    let live = strategies::list_by_status(db, StrategyStatus::Live).await?;
    for strategy in live {
        if let Err(err) = refresh_live_rollup(db, strategy.id, scorer_cfg).await {
            warn!(strategy_id = %strategy.id, error = %err, "live rollup refresh failed");
        }
    }
    Ok(())
}

/// One full maintenance sweep: stale-claim reaping, metrics snapshot, cache
/// freshness, live-rollup refresh.
pub async fn run_sweep(db: &PgPool, cache: &CacheReader, cfg: &SchedulerConfig, scorer_cfg: &LiveScorerConfig) -> Result<()> {
    reap_stale_claims(db, cfg).await?;
    snapshot_metrics(db, cfg).await?;
    check_cache_freshness(cache)?;
    refresh_all_live_rollups(db, scorer_cfg).await?;
    Ok(())
}
