//! Scenario: the claim CTE gives at most one worker a given strategy row.
//!
//! `flow_db::claim::claim` uses `FOR UPDATE SKIP LOCKED` so a second caller
//! racing the same status bucket sees no available row rather than blocking.
//!
//! All tests skip when `FLOW_DATABASE_URL` is not set.

use chrono::Utc;
use flow_db::claim::{self, ClaimOrder};
use flow_schemas::{GenerationMode, Strategy, StrategyKind, StrategyStatus, Timeframe};
use uuid::Uuid;

async fn make_pool() -> Option<sqlx::PgPool> {
    let url = std::env::var(flow_db::ENV_DB_URL).ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect");
    flow_db::migrate(&pool).await.expect("migrate");
    Some(pool)
}

fn sample_strategy(name: &str) -> Strategy {
    Strategy {
        id: Uuid::new_v4(),
        name: name.to_string(),
        kind: StrategyKind::Trd,
        timeframe: Timeframe::H1,
        code: b"pass".to_vec(),
        pattern_coins: None,
        backtest_pairs: None,
        optimal_timeframe: None,
        parameters: None,
        status: StrategyStatus::Generated,
        processing_by: None,
        processing_started_at: None,
        score_backtest: None,
        score_live: None,
        win_rate_live: None,
        expectancy_live: None,
        sharpe_live: None,
        max_drawdown_live: None,
        total_trades_live: None,
        total_pnl_live: None,
        last_live_update: None,
        live_degradation_pct: None,
        last_backtested_at: None,
        retired_at: None,
        retired_reason: None,
        template_id: None,
        pattern_ids: None,
        generation_mode: GenerationMode::Ai,
        parametric_backtest_metrics: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn only_one_worker_claims_row_second_gets_nothing() -> anyhow::Result<()> {
    let Some(pool) = make_pool().await else {
        eprintln!("SKIP: FLOW_DATABASE_URL not set");
        return Ok(());
    };

    let s = sample_strategy("claim-lock-test");
    let id = s.id;
    flow_db::strategies::insert(&pool, &s).await?;

    let claimed_a = claim::claim(&pool, StrategyStatus::Generated, "worker-a", ClaimOrder::New).await?;
    let claimed_a = claimed_a.expect("worker-a must claim the row");
    assert_eq!(claimed_a.strategy.id, id);
    assert_eq!(claimed_a.held_by, "worker-a");

    let claimed_b = claim::claim(&pool, StrategyStatus::Generated, "worker-b", ClaimOrder::New).await?;
    assert!(claimed_b.is_none(), "worker-b must find no available row");

    Ok(())
}

#[tokio::test]
async fn release_returns_row_to_available_for_next_status() -> anyhow::Result<()> {
    let Some(pool) = make_pool().await else {
        eprintln!("SKIP: FLOW_DATABASE_URL not set");
        return Ok(());
    };

    let s = sample_strategy("claim-release-test");
    let id = s.id;
    flow_db::strategies::insert(&pool, &s).await?;

    let claimed = claim::claim(&pool, StrategyStatus::Generated, "worker-a", ClaimOrder::New)
        .await?
        .expect("must claim");
    assert_eq!(claimed.strategy.id, id);

    claim::release(&pool, id, StrategyStatus::Validated).await?;

    let fetched = flow_db::strategies::fetch(&pool, id).await?;
    assert_eq!(fetched.status, StrategyStatus::Validated);
    assert!(fetched.processing_by.is_none());

    let next = claim::claim(&pool, StrategyStatus::Validated, "worker-b", ClaimOrder::New).await?;
    assert!(next.is_some(), "released row must be claimable under its new status");

    Ok(())
}

#[tokio::test]
async fn mark_failed_without_delete_sets_failed_and_clears_lease() -> anyhow::Result<()> {
    let Some(pool) = make_pool().await else {
        eprintln!("SKIP: FLOW_DATABASE_URL not set");
        return Ok(());
    };

    let s = sample_strategy("claim-fail-test");
    let id = s.id;
    flow_db::strategies::insert(&pool, &s).await?;

    claim::claim(&pool, StrategyStatus::Generated, "worker-a", ClaimOrder::New)
        .await?
        .expect("must claim");

    claim::mark_failed(&pool, id, "indicator computation panicked", false).await?;

    let fetched = flow_db::strategies::fetch(&pool, id).await?;
    assert_eq!(fetched.status, StrategyStatus::Failed);
    assert!(fetched.processing_by.is_none());
    assert_eq!(fetched.retired_reason.as_deref(), Some("indicator computation panicked"));

    Ok(())
}

#[tokio::test]
async fn mark_failed_with_delete_removes_the_row() -> anyhow::Result<()> {
    let Some(pool) = make_pool().await else {
        eprintln!("SKIP: FLOW_DATABASE_URL not set");
        return Ok(());
    };

    let s = sample_strategy("claim-delete-test");
    let id = s.id;
    flow_db::strategies::insert(&pool, &s).await?;

    claim::claim(&pool, StrategyStatus::Generated, "worker-a", ClaimOrder::New)
        .await?
        .expect("must claim");

    claim::mark_failed(&pool, id, "malformed code", true).await?;

    let err = flow_db::strategies::fetch(&pool, id).await.unwrap_err();
    assert!(err.to_string().contains("fetch strategy failed") || format!("{err:?}").contains("RowNotFound"));

    Ok(())
}
