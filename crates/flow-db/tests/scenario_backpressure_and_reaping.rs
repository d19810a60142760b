//! Scenario: backpressure cooldown formula (spec §4.2) and stale-claim
//! reaping (spec §4.1 Scheduler maintenance).

use chrono::{Duration, Utc};
use flow_db::claim::{self, calculate_backpressure_cooldown, ClaimOrder};
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
        kind: StrategyKind::Mom,
        timeframe: Timeframe::M15,
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
        generation_mode: GenerationMode::Template,
        parametric_backtest_metrics: None,
        created_at: Utc::now(),
    }
}

#[test]
fn cooldown_is_base_when_depth_at_or_under_limit() {
    let c = calculate_backpressure_cooldown(3, 5, 2.0, 1.0, 60.0);
    assert_eq!(c, 2.0, "no penalty term while depth <= limit");
}

#[test]
fn cooldown_scales_linearly_above_limit() {
    let c = calculate_backpressure_cooldown(8, 5, 2.0, 1.0, 60.0);
    assert_eq!(c, 2.0 + 1.0 * 3.0);
}

#[test]
fn cooldown_clamps_at_max() {
    let c = calculate_backpressure_cooldown(1000, 5, 2.0, 1.0, 60.0);
    assert_eq!(c, 60.0);
}

#[test]
fn cooldown_never_negative_at_exact_limit() {
    let c = calculate_backpressure_cooldown(5, 5, 2.0, 1.0, 60.0);
    assert_eq!(c, 2.0);
}

#[tokio::test]
async fn reap_stale_claims_releases_leases_past_the_threshold() -> anyhow::Result<()> {
    let Some(pool) = make_pool().await else {
        eprintln!("SKIP: FLOW_DATABASE_URL not set");
        return Ok(());
    };

    let s = sample_strategy("reap-test");
    let id = s.id;
    flow_db::strategies::insert(&pool, &s).await?;

    claim::claim(&pool, StrategyStatus::Generated, "worker-stuck", ClaimOrder::New)
        .await?
        .expect("must claim");

    // Backdate the lease so it looks stale without sleeping in the test.
    sqlx::query("update strategies set processing_started_at = $1 where id = $2")
        .bind(Utc::now() - Duration::seconds(3600))
        .bind(id)
        .execute(&pool)
        .await?;

    let reaped = claim::reap_stale_claims(&pool, 300).await?;
    assert!(reaped >= 1, "at least the stuck row must be reaped");

    let fetched = flow_db::strategies::fetch(&pool, id).await?;
    assert!(fetched.processing_by.is_none(), "reaping must clear the lease");
    assert_eq!(fetched.status, StrategyStatus::Generated, "reaping restores the prior status, not a new one");

    Ok(())
}

#[tokio::test]
async fn release_all_by_process_clears_every_lease_for_that_worker() -> anyhow::Result<()> {
    let Some(pool) = make_pool().await else {
        eprintln!("SKIP: FLOW_DATABASE_URL not set");
        return Ok(());
    };

    let a = sample_strategy("release-all-a");
    let b = sample_strategy("release-all-b");
    flow_db::strategies::insert(&pool, &a).await?;
    flow_db::strategies::insert(&pool, &b).await?;

    claim::claim(&pool, StrategyStatus::Generated, "worker-shutdown", ClaimOrder::New).await?;
    claim::claim(&pool, StrategyStatus::Generated, "worker-shutdown", ClaimOrder::New).await?;

    let released = claim::release_all_by_process(&pool, "worker-shutdown").await?;
    assert!(released >= 2);

    let fetched_a = flow_db::strategies::fetch(&pool, a.id).await?;
    assert!(fetched_a.processing_by.is_none());

    Ok(())
}
