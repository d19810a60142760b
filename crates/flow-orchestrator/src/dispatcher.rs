//! Process-wide scheduling loop (spec §4.9): `N_base + 1` elastic workers
//! draining two logical queues, downstream backpressure, and graceful
//! SIGINT/SIGTERM cancellation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use flow_cache::CacheReader;
use flow_db::claim::{self, ClaimOrder};
use flow_eval::EvaluatorConfig;
use flow_schemas::{Strategy, StrategyStatus};
use flow_strategy::StrategyLoader;
use sqlx::PgPool;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::pipeline::{self, CoinSetConfig, StrategyOutcome, TradingUniverse};
use crate::pool_gateway::PoolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Base,
    Elastic,
}

/// Shared, cheaply-cloneable handles every spawned worker task needs.
pub struct Deps {
    pub db: PgPool,
    pub cache: Arc<CacheReader>,
    pub loader: Arc<dyn StrategyLoader>,
    pub universe: Arc<dyn TradingUniverse>,
    pub coinset_cfg: CoinSetConfig,
    pub eval_cfg: EvaluatorConfig,
    pub pool_cfg: PoolConfig,
}

impl Clone for Deps {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            cache: self.cache.clone(),
            loader: self.loader.clone(),
            universe: self.universe.clone(),
            coinset_cfg: self.coinset_cfg,
            eval_cfg: self.eval_cfg.clone(),
            pool_cfg: self.pool_cfg,
        }
    }
}

fn is_due_for_retest(strategy: &Strategy, retest_interval_days: i64) -> bool {
    match strategy.last_backtested_at {
        None => true,
        Some(ts) => Utc::now() - ts >= ChronoDuration::days(retest_interval_days),
    }
}

async fn settle_outcome(db: &PgPool, strategy_id: uuid::Uuid, outcome: Result<StrategyOutcome>) -> Result<()> {
    match outcome {
        Ok(StrategyOutcome::Admitted) => Ok(()),
        Ok(StrategyOutcome::Retired { .. }) => Ok(()), // pipeline already persisted the RETIRED transition
        Ok(StrategyOutcome::LoaderFailed { reason }) => {
            warn!(%strategy_id, %reason, "strategy loader failed, deleting row");
            claim::mark_failed(db, strategy_id, &reason, true).await
        }
        Ok(StrategyOutcome::EvaluationFailed { reason }) => {
            warn!(%strategy_id, %reason, "strategy evaluation failed");
            claim::mark_failed(db, strategy_id, &reason, false).await
        }
        Err(err) => {
            // Spec §4.9's propagation policy: a worker never lets an exception
            // escape into the dispatcher; the row falls back to FAILED.
            let reason = format!("{err:#}");
            warn!(%strategy_id, %reason, "strategy task returned an unexpected error");
            claim::mark_failed(db, strategy_id, &reason, false).await
        }
    }
}

fn spawn_new_work(tasks: &mut JoinSet<(SlotKind, uuid::Uuid, Result<StrategyOutcome>)>, slot: SlotKind, deps: Deps, orch_cfg: OrchestratorConfig, strategy: Strategy) {
    tasks.spawn(async move {
        let id = strategy.id;
        let result = pipeline::run_new_work(
            &deps.db,
            &deps.cache,
            deps.loader.as_ref(),
            deps.universe.as_ref(),
            &strategy,
            &deps.coinset_cfg,
            &deps.eval_cfg,
            &deps.pool_cfg,
            &orch_cfg,
        )
        .await;
        (slot, id, result)
    });
}

fn spawn_re_work(tasks: &mut JoinSet<(SlotKind, uuid::Uuid, Result<StrategyOutcome>)>, slot: SlotKind, deps: Deps, orch_cfg: OrchestratorConfig, strategy: Strategy) {
    tasks.spawn(async move {
        let id = strategy.id;
        let result = pipeline::run_re_work(
            &deps.db,
            &deps.cache,
            deps.loader.as_ref(),
            deps.universe.as_ref(),
            &strategy,
            &deps.coinset_cfg,
            &deps.eval_cfg,
            &deps.pool_cfg,
            &orch_cfg,
        )
        .await;
        (slot, id, result)
    });
}

/// Runs the orchestrator loop until SIGINT/SIGTERM, releasing every lease
/// this process holds before returning (spec §4.9's cancellation contract).
pub async fn run(deps: Deps, orch_cfg: OrchestratorConfig, process_id: String) -> Result<()> {
    let mut tasks: JoinSet<(SlotKind, uuid::Uuid, Result<StrategyOutcome>)> = JoinSet::new();
    let mut base_in_flight = 0usize;
    let mut elastic_in_flight = false;
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).context("install SIGTERM handler failed")?;

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("orchestrator received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("orchestrator received SIGTERM, shutting down");
                break;
            }
            Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                let (slot, strategy_id, outcome) = done.context("worker task panicked")?;
                match slot {
                    SlotKind::Base => base_in_flight -= 1,
                    SlotKind::Elastic => elastic_in_flight = false,
                }
                settle_outcome(&deps.db, strategy_id, outcome).await?;
            }
            _ = tick.tick() => {
                info!(base_in_flight, elastic_in_flight, in_flight = tasks.len(), "orchestrator tick");

                let active_count = flow_db::strategies::count_by_status(&deps.db, StrategyStatus::Active).await?;
                if active_count >= orch_cfg.pool_max_size {
                    let cooldown = claim::calculate_backpressure_cooldown(
                        active_count,
                        orch_cfg.pool_max_size,
                        orch_cfg.backpressure_base_secs,
                        orch_cfg.backpressure_increment_secs,
                        orch_cfg.backpressure_max_secs,
                    );
                    info!(active_count, cooldown, "downstream backpressure, not claiming more work");
                    tokio::time::sleep(Duration::from_secs_f64(cooldown)).await;
                    continue;
                }

                if !elastic_in_flight {
                    if let Some(claimed) = claim::claim(&deps.db, StrategyStatus::Active, &process_id, ClaimOrder::Rework).await? {
                        if is_due_for_retest(&claimed.strategy, orch_cfg.retest_interval_days) {
                            elastic_in_flight = true;
                            spawn_re_work(&mut tasks, SlotKind::Elastic, deps.clone(), orch_cfg, claimed.strategy);
                        } else {
                            claim::release(&deps.db, claimed.strategy.id, StrategyStatus::Active).await?;
                        }
                    }
                }

                while base_in_flight < orch_cfg.n_base_workers {
                    match claim::claim(&deps.db, StrategyStatus::Validated, &process_id, ClaimOrder::New).await? {
                        Some(claimed) => {
                            base_in_flight += 1;
                            spawn_new_work(&mut tasks, SlotKind::Base, deps.clone(), orch_cfg, claimed.strategy);
                        }
                        None => break,
                    }
                }

                if !elastic_in_flight {
                    if let Some(claimed) = claim::claim(&deps.db, StrategyStatus::Validated, &process_id, ClaimOrder::New).await? {
                        elastic_in_flight = true;
                        spawn_new_work(&mut tasks, SlotKind::Elastic, deps.clone(), orch_cfg, claimed.strategy);
                    }
                }
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        if let Ok((_, strategy_id, outcome)) = done {
            settle_outcome(&deps.db, strategy_id, outcome).await?;
        }
    }

    let released = claim::release_all_by_process(&deps.db, &process_id).await?;
    info!(released, "orchestrator cancellation complete");
    Ok(())
}
