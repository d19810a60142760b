//! Bridges the pure Pool Manager logic ([`flow_pool`]) to the `strategies`
//! table: lock the current ACTIVE leaderboard, apply the admission
//! decision, persist the resulting transition — all inside one transaction
//! so a concurrent admission/eviction can't interleave (spec §4.8).

use anyhow::{Context, Result};
pub use flow_pool::{AdmissionOutcome, PoolConfig};
use flow_pool::{revalidate_after_retest as pure_revalidate, try_enter_pool as pure_try_enter_pool, ActivePool};
use sqlx::{PgPool, Row};
use uuid::Uuid;

async fn load_active_locked(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<ActivePool> {
    let rows = sqlx::query("select id, score_backtest from strategies where status = 'ACTIVE' for update")
        .fetch_all(&mut **tx)
        .await
        .context("lock ACTIVE pool rows failed")?;

    let mut active = ActivePool::new();
    for row in rows {
        let id: Uuid = row.try_get("id")?;
        let score: Option<f64> = row.try_get("score_backtest")?;
        if let Some(score) = score {
            active.insert(id, score);
        }
    }
    Ok(active)
}

async fn apply_outcome(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, id: Uuid, score: f64, outcome: &AdmissionOutcome) -> Result<()> {
    match outcome {
        AdmissionOutcome::Admitted { evicted } => {
            if let Some(evicted_id) = evicted {
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
                .bind(evicted_id)
                .bind("Evicted: leaderboard admission")
                .execute(&mut **tx)
                .await
                .context("retire evicted strategy failed")?;
            }

            sqlx::query(
                r#"
                update strategies
                   set status = 'ACTIVE',
                       score_backtest = $2,
                       last_backtested_at = now(),
                       processing_by = null,
                       processing_started_at = null
                 where id = $1
                "#,
            )
            .bind(id)
            .bind(score)
            .execute(&mut **tx)
            .await
            .context("activate admitted strategy failed")?;
        }
        AdmissionOutcome::Retired { reason } => {
            sqlx::query(
                r#"
                update strategies
                   set status = 'RETIRED',
                       score_backtest = $2,
                       retired_at = coalesce(retired_at, now()),
                       retired_reason = $3,
                       processing_by = null,
                       processing_started_at = null
                 where id = $1
                "#,
            )
            .bind(id)
            .bind(score)
            .bind(reason)
            .execute(&mut **tx)
            .await
            .context("retire rejected strategy failed")?;
        }
    }
    Ok(())
}

/// Spec §4.9 step 5's `PoolManager.try_enter_pool` call, transactionally.
pub async fn try_enter_pool(pool: &PgPool, cfg: &PoolConfig, id: Uuid, score: f64) -> Result<AdmissionOutcome> {
    let mut tx = pool.begin().await.context("begin pool transaction failed")?;
    let mut active = load_active_locked(&mut tx).await?;
    let outcome = pure_try_enter_pool(cfg, &mut active, id, score);
    apply_outcome(&mut tx, id, score, &outcome).await?;
    tx.commit().await.context("commit pool transaction failed")?;
    Ok(outcome)
}

/// Spec §4.9 RE-WORK flow's `PoolManager.revalidate_after_retest` call.
pub async fn revalidate_after_retest(pool: &PgPool, cfg: &PoolConfig, id: Uuid, new_score: f64) -> Result<AdmissionOutcome> {
    let mut tx = pool.begin().await.context("begin pool transaction failed")?;
    let mut active = load_active_locked(&mut tx).await?;
    let outcome = pure_revalidate(cfg, &mut active, id, new_score);
    apply_outcome(&mut tx, id, new_score, &outcome).await?;
    tx.commit().await.context("commit pool transaction failed")?;
    Ok(outcome)
}
