//! CRUD over the `strategies` table (spec §3's central row).
//!
//! Lease/claim mutation lives in [`crate::claim`]; this module owns
//! insertion, point lookups, and the mutations the Evaluator/Pool Manager
//! perform once a strategy is no longer claimed by a worker.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use flow_schemas::{
    GenerationMode, ParamTuple, Strategy, StrategyKind, StrategyStatus, Timeframe,
};

pub(crate) fn row_to_strategy(row: sqlx::postgres::PgRow) -> Result<Strategy> {
    let kind_str: String = row.try_get("kind")?;
    let timeframe_str: String = row.try_get("timeframe")?;
    let optimal_timeframe_str: Option<String> = row.try_get("optimal_timeframe")?;
    let status_str: String = row.try_get("status")?;
    let generation_mode_str: String = row.try_get("generation_mode")?;
    let parameters_json: Option<Value> = row.try_get("parameters")?;
    let pattern_coins_json: Option<Value> = row.try_get("pattern_coins")?;
    let backtest_pairs_json: Option<Value> = row.try_get("backtest_pairs")?;
    let pattern_ids_json: Option<Value> = row.try_get("pattern_ids")?;

    Ok(Strategy {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: StrategyKind::parse(&kind_str)
            .with_context(|| format!("unknown strategy kind in DB: {kind_str}"))?,
        timeframe: Timeframe::parse(&timeframe_str)
            .with_context(|| format!("unknown timeframe in DB: {timeframe_str}"))?,
        code: row.try_get("code")?,
        pattern_coins: pattern_coins_json
            .map(serde_json::from_value)
            .transpose()
            .context("pattern_coins JSON decode")?,
        backtest_pairs: backtest_pairs_json
            .map(serde_json::from_value)
            .transpose()
            .context("backtest_pairs JSON decode")?,
        optimal_timeframe: optimal_timeframe_str
            .map(|s| {
                Timeframe::parse(&s)
                    .with_context(|| format!("unknown optimal_timeframe in DB: {s}"))
            })
            .transpose()?,
        parameters: parameters_json
            .map(serde_json::from_value::<ParamTuple>)
            .transpose()
            .context("parameters JSON decode")?,
        status: StrategyStatus::parse(&status_str)
            .with_context(|| format!("unknown status in DB: {status_str}"))?,
        processing_by: row.try_get("processing_by")?,
        processing_started_at: row.try_get("processing_started_at")?,
        score_backtest: row.try_get("score_backtest")?,
        score_live: row.try_get("score_live")?,
        win_rate_live: row.try_get("win_rate_live")?,
        expectancy_live: row.try_get("expectancy_live")?,
        sharpe_live: row.try_get("sharpe_live")?,
        max_drawdown_live: row.try_get("max_drawdown_live")?,
        total_trades_live: row
            .try_get::<Option<i32>, _>("total_trades_live")?
            .map(i64::from),
        total_pnl_live: row.try_get("total_pnl_live")?,
        last_live_update: row.try_get("last_live_update")?,
        live_degradation_pct: row.try_get("live_degradation_pct")?,
        last_backtested_at: row.try_get("last_backtested_at")?,
        retired_at: row.try_get("retired_at")?,
        retired_reason: row.try_get("retired_reason")?,
        template_id: row.try_get("template_id")?,
        pattern_ids: pattern_ids_json
            .map(serde_json::from_value)
            .transpose()
            .context("pattern_ids JSON decode")?,
        generation_mode: GenerationMode::parse(&generation_mode_str)
            .with_context(|| format!("unknown generation_mode in DB: {generation_mode_str}"))?,
        parametric_backtest_metrics: row.try_get("parametric_backtest_metrics")?,
        created_at: row.try_get("created_at")?,
    })
}

const SELECT_COLUMNS: &str = r#"
    id, name, kind, timeframe, code, pattern_coins, backtest_pairs, optimal_timeframe,
    parameters, status, processing_by, processing_started_at, score_backtest, score_live,
    win_rate_live, expectancy_live, sharpe_live, max_drawdown_live, total_trades_live,
    total_pnl_live, last_live_update, live_degradation_pct, last_backtested_at, retired_at,
    retired_reason, template_id, pattern_ids, generation_mode, parametric_backtest_metrics,
    created_at
"#;

/// Insert a freshly authored strategy row in GENERATED status.
pub async fn insert(pool: &PgPool, s: &Strategy) -> Result<()> {
    sqlx::query(
        r#"
        insert into strategies (
            id, name, kind, timeframe, code, pattern_coins, backtest_pairs, optimal_timeframe,
            parameters, status, generation_mode, template_id, pattern_ids, created_at
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
        )
        "#,
    )
    .bind(s.id)
    .bind(&s.name)
    .bind(s.kind.as_str())
    .bind(s.timeframe.as_str())
    .bind(&s.code)
    .bind(s.pattern_coins.as_ref().map(|v| serde_json::to_value(v)).transpose()?)
    .bind(s.backtest_pairs.as_ref().map(|v| serde_json::to_value(v)).transpose()?)
    .bind(s.optimal_timeframe.map(|tf| tf.as_str()))
    .bind(serde_json::to_value(s.parameters)?)
    .bind(s.status.as_str())
    .bind(s.generation_mode.as_str())
    .bind(s.template_id)
    .bind(s.pattern_ids.as_ref().map(|v| serde_json::to_value(v)).transpose()?)
    .bind(s.created_at)
    .execute(pool)
    .await
    .context("insert strategy failed")?;

    Ok(())
}

pub async fn fetch(pool: &PgPool, id: Uuid) -> Result<Strategy> {
    let row = sqlx::query(&format!("select {SELECT_COLUMNS} from strategies where id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
        .context("fetch strategy failed")?;
    row_to_strategy(row)
}

pub async fn list_by_status(pool: &PgPool, status: StrategyStatus) -> Result<Vec<Strategy>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from strategies where status = $1 order by created_at asc"
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await
    .context("list_by_status failed")?;

    rows.into_iter().map(row_to_strategy).collect()
}

/// Total rows in `status`, regardless of claim state — the orchestrator's
/// downstream-backpressure signal (`|ACTIVE| >= pool.max_size`, spec §4.9).
pub async fn count_by_status(pool: &PgPool, status: StrategyStatus) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as("select count(*)::bigint from strategies where status = $1")
        .bind(status.as_str())
        .fetch_one(pool)
        .await
        .context("count_by_status failed")?;
    Ok(n)
}

/// Set the parametric-kernel-chosen optimal timeframe, backtest pairs, and
/// score after a successful backtest, without touching the claim lease.
pub async fn record_backtest_outcome(
    pool: &PgPool,
    id: Uuid,
    optimal_timeframe: Timeframe,
    backtest_pairs: &[String],
    score_backtest: f64,
    parametric_backtest_metrics: Option<Value>,
) -> Result<()> {
    sqlx::query(
        r#"
        update strategies
           set optimal_timeframe = $2,
               backtest_pairs = $3,
               score_backtest = $4,
               last_backtested_at = now(),
               parametric_backtest_metrics = coalesce($5, parametric_backtest_metrics)
         where id = $1
        "#,
    )
    .bind(id)
    .bind(optimal_timeframe.as_str())
    .bind(serde_json::to_value(backtest_pairs)?)
    .bind(score_backtest)
    .bind(parametric_backtest_metrics)
    .execute(pool)
    .await
    .context("record_backtest_outcome failed")?;

    Ok(())
}

/// Transition a strategy into the ACTIVE pool (Pool Manager admission,
/// spec §4.8). Clears any lease the claim layer still held.
pub async fn activate(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        update strategies
           set status = 'ACTIVE',
               last_backtested_at = now(),
               processing_by = null,
               processing_started_at = null
         where id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await
    .context("activate strategy failed")?;

    Ok(())
}

/// Retire a strategy with a reason (PoolReject / ValidationFailure outcomes).
/// `retired_at` is monotonic: a second call is a no-op if already retired.
pub async fn retire(pool: &PgPool, id: Uuid, reason: &str) -> Result<()> {
    sqlx::query(
        r#"
        update strategies
           set status = 'RETIRED',
               retired_at = coalesce(retired_at, now()),
               retired_reason = $2,
               processing_by = null,
               processing_started_at = null
         where id = $1
        "#,
    )
    .bind(id)
    .bind(reason)
    .execute(pool)
    .await
    .context("retire strategy failed")?;

    Ok(())
}

/// Write the live-rollup fields (Scorer's only mutation path on Strategy).
#[allow(clippy::too_many_arguments)]
pub async fn update_live_rollup(
    pool: &PgPool,
    id: Uuid,
    score_live: f64,
    win_rate_live: f64,
    expectancy_live: f64,
    sharpe_live: f64,
    max_drawdown_live: f64,
    total_trades_live: i64,
    total_pnl_live: rust_decimal::Decimal,
    live_degradation_pct: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        update strategies
           set score_live = $2,
               win_rate_live = $3,
               expectancy_live = $4,
               sharpe_live = $5,
               max_drawdown_live = $6,
               total_trades_live = $7,
               total_pnl_live = $8,
               live_degradation_pct = $9,
               last_live_update = now()
         where id = $1
        "#,
    )
    .bind(id)
    .bind(score_live)
    .bind(win_rate_live)
    .bind(expectancy_live)
    .bind(sharpe_live)
    .bind(max_drawdown_live)
    .bind(total_trades_live as i32)
    .bind(total_pnl_live)
    .bind(live_degradation_pct)
    .execute(pool)
    .await
    .context("update_live_rollup failed")?;

    Ok(())
}

/// Transition ACTIVE -> LIVE (the Rotator's mutation). The lease must
/// already be clear; the Rotator claims ACTIVE work via the claim layer
/// first.
pub async fn promote_to_live(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("update strategies set status = 'LIVE' where id = $1 and status = 'ACTIVE'")
        .bind(id)
        .execute(pool)
        .await
        .context("promote_to_live failed")?;
    Ok(())
}

/// Transition LIVE -> ACTIVE: a strategy that has been displaced from the
/// bounded live rotation but remains a legitimate ACTIVE-pool member (it was
/// outranked, not retired).
pub async fn demote_to_active(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query("update strategies set status = 'ACTIVE' where id = $1 and status = 'LIVE'")
        .bind(id)
        .execute(pool)
        .await
        .context("demote_to_active failed")?;
    Ok(())
}
