//! flow-rotator: the live-rotation boundary of the Pool Manager (spec §4.8).
//!
//! §4.8 specifies ACTIVE-pool admission/eviction (`flow-pool`, driven from
//! the backtester's retest outcomes) but is silent on what selects which
//! ACTIVE members actually trade live. This process closes that gap with a
//! bounded top-K leaderboard: every sweep, rank ACTIVE+LIVE strategies by
//! `score_backtest` and promote the top `live_pool_size` to LIVE, demoting
//! any current LIVE member that falls out of the cut. Rows with a live
//! claim lease held (`processing_by` set) are left alone for this sweep —
//! they are mid-retest in the backtester and get picked up next cycle.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use flow_cli::CommonArgs;
use flow_schemas::{Strategy, StrategyStatus};
use sqlx::PgPool;
use tracing::info;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of strategies allowed to hold LIVE status at once. CLI-only:
    /// spec §6 has no config key for this, since §4.8 never names the
    /// live-rotation boundary explicitly.
    #[arg(long, default_value_t = 5)]
    live_pool_size: usize,

    /// Interval between rotation sweeps.
    #[arg(long, default_value_t = 300)]
    tick_interval_secs: u64,
}

/// One rotation sweep: promote/demote so LIVE holds exactly the top
/// `live_pool_size` by `score_backtest` among unclaimed ACTIVE+LIVE rows.
async fn run_sweep(db: &PgPool, live_pool_size: usize) -> Result<()> {
    let mut candidates: Vec<Strategy> = flow_db::strategies::list_by_status(db, StrategyStatus::Active).await?;
    candidates.extend(flow_db::strategies::list_by_status(db, StrategyStatus::Live).await?);
    candidates.retain(|s| s.processing_by.is_none());

    candidates.sort_by(|a, b| {
        b.score_backtest
            .unwrap_or(f64::MIN)
            .partial_cmp(&a.score_backtest.unwrap_or(f64::MIN))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let (top, rest) = if candidates.len() > live_pool_size {
        candidates.split_at(live_pool_size)
    } else {
        (candidates.as_slice(), &[][..])
    };

    for s in top {
        if s.status == StrategyStatus::Active {
            flow_db::strategies::promote_to_live(db, s.id).await?;
            info!(strategy_id = %s.id, score = s.score_backtest, "promoted to LIVE");
        }
    }
    for s in rest {
        if s.status == StrategyStatus::Live {
            flow_db::strategies::demote_to_active(db, s.id).await?;
            info!(strategy_id = %s.id, score = s.score_backtest, "demoted to ACTIVE");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    flow_cli::load_dotenv();
    flow_cli::init_tracing();
    let args = Args::parse();
    let _cfg = args.common.load_pipeline_config()?;

    let db = flow_db::connect_from_env().await?;
    flow_db::migrate(&db).await?;

    let mut tick = tokio::time::interval(Duration::from_secs(args.tick_interval_secs));
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => { info!("rotator received SIGINT, shutting down"); break; }
            _ = sigterm.recv() => { info!("rotator received SIGTERM, shutting down"); break; }
            _ = tick.tick() => {
                if let Err(err) = run_sweep(&db, args.live_pool_size).await {
                    tracing::error!(error = %err, "rotation sweep failed");
                }
            }
        }
    }

    Ok(())
}
