//! Work-Claim Layer (spec §4.1): atomic cross-process claim/release over
//! `strategies`, implemented as `SELECT ... FOR UPDATE SKIP LOCKED` so
//! concurrent claimers never pick the same row — the same pattern the
//! teacher's `mqk-db::outbox_claim_batch` uses for its dispatch queue.

use anyhow::{Context, Result};
use flow_schemas::{Strategy, StrategyStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::strategies::row_to_strategy;

/// Errors specific to claim/release misuse, distinct from the generic
/// `anyhow` wrapping used for transport-level DB failures.
#[derive(Debug)]
pub enum ClaimError {
    /// `release`/`mark_failed` called against a row this process does not
    /// hold the lease on.
    NotHeldByCaller { id: Uuid },
}

impl std::fmt::Display for ClaimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimError::NotHeldByCaller { id } => {
                write!(f, "strategy {id} is not held by the calling process")
            }
        }
    }
}

impl std::error::Error for ClaimError {}

/// Selection order for `claim`: `New` is FIFO by `created_at` (fresh work
/// entering a status for the first time); `Rework` is FIFO by
/// `last_backtested_at` (re-validation / periodic re-backtest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOrder {
    New,
    Rework,
}

/// A claimed row together with the process id that now holds its lease.
#[derive(Debug, Clone)]
pub struct StrategyClaim {
    pub strategy: Strategy,
    pub held_by: String,
}

const SELECT_COLUMNS: &str = r#"
    id, name, kind, timeframe, code, pattern_coins, backtest_pairs, optimal_timeframe,
    parameters, status, processing_by, processing_started_at, score_backtest, score_live,
    win_rate_live, expectancy_live, sharpe_live, max_drawdown_live, total_trades_live,
    total_pnl_live, last_live_update, live_degradation_pct, last_backtested_at, retired_at,
    retired_reason, template_id, pattern_ids, generation_mode, parametric_backtest_metrics,
    created_at
"#;

/// Atomically pick one unclaimed row with `status = target`, set
/// `processing_by`/`processing_started_at`, and return it. `Ok(None)` means
/// no eligible row was available.
pub async fn claim(
    pool: &PgPool,
    target: StrategyStatus,
    process_id: &str,
    order: ClaimOrder,
) -> Result<Option<StrategyClaim>> {
    let order_clause = match order {
        ClaimOrder::New => "created_at asc, id asc",
        ClaimOrder::Rework => "last_backtested_at asc nulls first, id asc",
    };

    let sql = format!(
        r#"
        with picked as (
            select id
            from strategies
            where status = $1
              and processing_by is null
            order by {order_clause}
            limit 1
            for update skip locked
        )
        update strategies
           set processing_by = $2,
               processing_started_at = now()
         where id in (select id from picked)
        returning {SELECT_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(target.as_str())
        .bind(process_id)
        .fetch_optional(pool)
        .await
        .context("claim failed")?;

    let Some(row) = row else { return Ok(None) };
    let strategy = row_to_strategy(row)?;
    Ok(Some(StrategyClaim {
        strategy,
        held_by: process_id.to_string(),
    }))
}

/// Release a held lease, transitioning to `next_status`.
pub async fn release(pool: &PgPool, id: Uuid, next_status: StrategyStatus) -> Result<()> {
    sqlx::query(
        r#"
        update strategies
           set status = $2,
               processing_by = null,
               processing_started_at = null
         where id = $1
        "#,
    )
    .bind(id)
    .bind(next_status.as_str())
    .execute(pool)
    .await
    .context("release failed")?;

    Ok(())
}

/// Either transition a row to FAILED with `reason` (delete=false), or
/// remove the row entirely (delete=true — used when the row could not
/// even be loaded, per spec §7's LoaderError handling).
pub async fn mark_failed(pool: &PgPool, id: Uuid, reason: &str, delete: bool) -> Result<()> {
    if delete {
        sqlx::query("delete from strategies where id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("mark_failed delete failed")?;
    } else {
        sqlx::query(
            r#"
            update strategies
               set status = 'FAILED',
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
        .context("mark_failed update failed")?;
    }
    Ok(())
}

/// Count unclaimed rows in `status` — the backpressure signal.
pub async fn count_available(pool: &PgPool, status: StrategyStatus) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        "select count(*)::bigint from strategies where status = $1 and processing_by is null",
    )
    .bind(status.as_str())
    .fetch_one(pool)
    .await
    .context("count_available failed")?;
    Ok(n)
}

/// Deterministic monotone backpressure cooldown (spec §4.1, expanded in
/// `original_source/src/orchestration/adaptive_scheduler.py`):
/// `min(max_cooldown, base + increment * (depth - limit))`, with `depth`
/// clamped to be `>= limit` so a shallow queue never yields a cooldown
/// below `base`.
pub fn calculate_backpressure_cooldown(
    depth: i64,
    limit: i64,
    base: f64,
    increment: f64,
    max_cooldown: f64,
) -> f64 {
    let clamped_depth = depth.max(limit);
    let over = (clamped_depth - limit) as f64;
    (base + increment * over).min(max_cooldown)
}

/// Release every lease held by `process_id`, clearing `processing_by`
/// without touching `status`. Called on shutdown so other workers can
/// take over.
pub async fn release_all_by_process(pool: &PgPool, process_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        update strategies
           set processing_by = null,
               processing_started_at = null
         where processing_by = $1
        "#,
    )
    .bind(process_id)
    .execute(pool)
    .await
    .context("release_all_by_process failed")?;

    Ok(result.rows_affected())
}

/// Reap leases whose `processing_started_at` is older than
/// `stale_after_secs` (the Scheduler's stale-claim reaping, spec §4.1 /
/// §8's `release_all_by_process` + re-claim invariant).
pub async fn reap_stale_claims(pool: &PgPool, stale_after_secs: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        update strategies
           set processing_by = null,
               processing_started_at = null
         where processing_by is not null
           and processing_started_at < now() - make_interval(secs => $1)
        "#,
    )
    .bind(stale_after_secs as f64)
    .execute(pool)
    .await
    .context("reap_stale_claims failed")?;

    Ok(result.rows_affected())
}
