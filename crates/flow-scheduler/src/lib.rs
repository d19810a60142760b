//! flow-scheduler
//!
//! Scheduler (spec §4.K): the long-running process that periodically reaps
//! stale claims, snapshots pipeline metrics, checks cache freshness, and
//! refreshes LIVE strategies' live rollups.

pub mod config;
pub mod maintenance;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use flow_cache::CacheReader;
use flow_eval::LiveScorerConfig;
use sqlx::PgPool;
use tracing::{error, info};

pub use config::SchedulerConfig;

/// Run the maintenance loop until SIGINT/SIGTERM.
pub async fn run(db: PgPool, cache: Arc<CacheReader>, cfg: SchedulerConfig, scorer_cfg: LiveScorerConfig) -> Result<()> {
    let mut tick = tokio::time::interval(Duration::from_secs(cfg.tick_interval_secs));
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!("scheduler received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("scheduler received SIGTERM, shutting down");
                break;
            }
            _ = tick.tick() => {
                if let Err(err) = maintenance::run_sweep(&db, &cache, &cfg, &scorer_cfg).await {
                    error!(error = %err, "maintenance sweep failed");
                }
            }
        }
    }

    Ok(())
}
