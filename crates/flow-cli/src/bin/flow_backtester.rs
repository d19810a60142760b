//! flow-backtester: the Backtester Orchestrator (spec §4.9), the
//! `N_base + 1` worker pool draining NEW-WORK (VALIDATED) and RE-WORK
//! (due-for-retest ACTIVE) strategies.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use flow_cache::CacheReader;
use flow_cli::CommonArgs;
use flow_eval::EvaluatorConfig;
use flow_orchestrator::{CoinSetConfig, Deps, OrchestratorConfig};
use flow_schemas::Strategy;
use flow_strategy::NativeLoader;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Root directory of the read-only OHLCV cache.
    #[arg(long, env = "FLOW_CACHE_DIR")]
    cache_dir: String,
}

/// The actively-traded universe read straight off the OHLCV cache. Market
/// data acquisition and exchange liquidity lookups are out of scope (spec
/// §1 Non-goals): any symbol the cache already holds bars for is the
/// universe this process can backtest against.
struct CacheBackedUniverse {
    cache: Arc<CacheReader>,
}

impl flow_orchestrator::TradingUniverse for CacheBackedUniverse {
    fn ranked_candidates(&self, _strategy: &Strategy) -> Vec<String> {
        self.cache.list_cached_symbols(None).unwrap_or_default()
    }

    fn is_actively_traded(&self, symbol: &str) -> bool {
        self.cache
            .list_cached_symbols(None)
            .map(|symbols| symbols.iter().any(|s| s == symbol))
            .unwrap_or(false)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    flow_cli::load_dotenv();
    flow_cli::init_tracing();
    let args = Args::parse();
    let cfg = args.common.load_pipeline_config()?;

    let db = flow_db::connect_from_env().await?;
    flow_db::migrate(&db).await?;
    let cache = Arc::new(CacheReader::new(&args.cache_dir)?);

    let orch_cfg = OrchestratorConfig {
        n_base_workers: cfg.backtesting.threads_validated as usize,
        retest_interval_days: cfg.backtesting.retest_interval_days as i64,
        pool_max_size: cfg.active_pool.max_size as i64,
        backpressure_base_secs: cfg.pipeline.backpressure.base_cooldown,
        backpressure_increment_secs: cfg.pipeline.backpressure.cooldown_increment,
        backpressure_max_secs: cfg.pipeline.backpressure.max_cooldown,
        initial_equity: cfg.backtesting.initial_capital,
        max_positions: None,
    };

    let coinset_cfg = CoinSetConfig {
        target_count: cfg.backtesting.max_coins as usize,
        min_count: 1,
        min_coverage_pct: cfg.backtesting.min_coverage_pct,
        training_days: cfg.backtesting.training_days as f64,
        holdout_days: cfg.backtesting.holdout_days as f64,
    };

    let eval_cfg = EvaluatorConfig {
        min_sharpe: cfg.backtesting.thresholds.min_sharpe,
        holdout_min_sharpe: cfg.backtesting.holdout.min_sharpe,
        max_degradation: cfg.backtesting.holdout.max_degradation,
        min_holdout_trades: cfg.backtesting.holdout.min_trades as usize,
        holdout_recency_weight: cfg.backtesting.holdout.recency_weight,
    };

    let pool_cfg = flow_orchestrator::PoolConfig {
        max_size: cfg.active_pool.max_size as usize,
        min_score_entry: cfg.active_pool.min_score_entry,
    };

    let deps = Deps {
        db,
        cache: cache.clone(),
        loader: Arc::new(NativeLoader::new()),
        universe: Arc::new(CacheBackedUniverse { cache }),
        coinset_cfg,
        eval_cfg,
        pool_cfg,
    };

    let process_id = format!("backtester-{}", Uuid::new_v4());
    info!(process_id, "starting backtester orchestrator");
    flow_orchestrator::run(deps, orch_cfg, process_id).await
}
