//! flow-scheduler: wraps `flow_scheduler::run` (spec §4.K) — the periodic
//! maintenance sweep (stale-claim reaping, metrics snapshot, cache-freshness
//! check, live-rollup refresh).

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use flow_cache::CacheReader;
use flow_cli::CommonArgs;
use flow_eval::LiveScorerConfig;
use flow_scheduler::SchedulerConfig;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long, env = "FLOW_CACHE_DIR")]
    cache_dir: String,

    #[arg(long, default_value_t = 60)]
    tick_interval_secs: u64,

    #[arg(long, default_value_t = 1800)]
    stale_threshold_secs: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    flow_cli::load_dotenv();
    flow_cli::init_tracing();
    let args = Args::parse();
    let pipeline_cfg = args.common.load_pipeline_config()?;

    let db = flow_db::connect_from_env().await?;
    flow_db::migrate(&db).await?;
    let cache = Arc::new(CacheReader::new(&args.cache_dir)?);

    let scheduler_cfg = SchedulerConfig {
        tick_interval_secs: args.tick_interval_secs,
        stale_threshold_secs: args.stale_threshold_secs,
        pool_max_size: pipeline_cfg.active_pool.max_size as i64,
    };

    flow_scheduler::run(db, cache, scheduler_cfg, LiveScorerConfig::default()).await
}
