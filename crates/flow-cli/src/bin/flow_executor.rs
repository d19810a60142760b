//! flow-executor: Execution Client Adapter + Trailing-Stop Service + Risk
//! Validator, wired into one live-trading loop over LIVE strategies (spec
//! §4.10, §4.12, §4.13).
//!
//! Market-data acquisition is out of scope (spec §1 Non-goals): the
//! strategy's signal is evaluated against the most recently cached bar for
//! each of its backtest pairs, the same cache-as-universe substitution
//! `flow-backtester` makes for the trading universe. `flow-broker-paper`'s
//! `PaperBroker` is the only `Venue` wired in — a live venue adapter is a
//! second crate behind the same trait.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use flow_broker_paper::PaperBroker;
use flow_cache::CacheReader;
use flow_cli::CommonArgs;
use flow_db::claim::{self, ClaimOrder};
use flow_execution::{normalize_symbol, select_subaccount, TriggerKind, Venue};
use flow_risk::{
    fixed_fractional_size, validate_and_adjust_leverage, validate_signal, RequestKind, RiskConfig,
    RiskInput, RiskState, SignalDirection, MICROS_SCALE,
};
use flow_schemas::{StrategyStatus, TradeSide};
use flow_strategy::{Direction, NativeLoader, StrategyLoader};
use flow_trailing::{PositionKey, StopOrderExecutor, TrailingBook, TrailingConfig};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long, env = "FLOW_CACHE_DIR")]
    cache_dir: String,

    #[arg(long, default_value = "audit-executor.jsonl")]
    audit_log: String,

    #[arg(long, default_value_t = 5)]
    idle_poll_secs: u64,
}

/// Delegates [`StopOrderExecutor`] to a [`Venue`]'s stop-loss trigger calls.
struct VenueStopExecutor<'a> {
    venue: &'a dyn Venue,
}

impl StopOrderExecutor for VenueStopExecutor<'_> {
    fn place_trigger_order(&self, symbol: &str, side: TradeSide, size: f64, trigger_price: f64) -> Result<String> {
        self.venue
            .place_trigger_order(symbol, side, size, TriggerKind::StopLoss, trigger_price)
            .map(|ack| ack.order_id)
    }

    fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        self.venue.cancel_order(symbol, order_id)
    }
}

fn risk_config_from(cfg: &flow_config::PipelineConfig, equity: f64) -> RiskConfig {
    let mut risk = RiskConfig::sane_defaults();
    risk.max_drawdown_limit_micros = ((equity * cfg.risk.emergency.max_portfolio_drawdown) * MICROS_SCALE as f64) as i64;
    risk.consecutive_loss_limit = cfg.risk.emergency.max_consecutive_losses as u32;
    risk
}

fn trailing_config_from(cfg: &flow_config::PipelineConfig, sl_pct: f64) -> TrailingConfig {
    TrailingConfig {
        activation_pct: sl_pct,
        trail_pct: sl_pct,
        breakeven_buffer_pct: cfg.risk.trailing.breakeven_buffer_pct,
        min_adjustment_pct: cfg.risk.trailing.min_adjustment_pct,
        update_cooldown_sec: cfg.risk.trailing.update_cooldown_sec as i64,
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_one_strategy(
    db: &sqlx::PgPool,
    cache: &CacheReader,
    loader: &NativeLoader,
    venue: &PaperBroker,
    trailing: &TrailingBook,
    cfg: &flow_config::PipelineConfig,
    risk_state: &mut RiskState,
    audit: &mut flow_audit::AuditWriter,
    strategy_id: Uuid,
    name: &str,
    code: &[u8],
    timeframe: flow_schemas::Timeframe,
    pairs: &[String],
) -> Result<()> {
    let capability = loader.load(name, code).context("strategy failed to load")?;
    let descriptor = capability.descriptor();

    for symbol in pairs {
        let bars = match cache.read(symbol, timeframe, Some(30), None) {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => continue,
            Err(err) => {
                warn!(%symbol, error = %err, "no cached bars for live symbol, skipping");
                continue;
            }
        };
        let frame = capability.calculate_indicators(&bars)?;
        let last = frame.len.saturating_sub(1);
        if frame.len == 0 || !frame.entries.get(last).copied().unwrap_or(false) {
            continue;
        }

        let entry_price = bars[last].close;
        let direction = match descriptor.direction {
            Direction::Long => SignalDirection::Long,
            Direction::Short => SignalDirection::Short,
        };
        let (sl_price, tp_price) = match descriptor.direction {
            Direction::Long => (
                entry_price * (1.0 - descriptor.sl_pct),
                entry_price * (1.0 + descriptor.tp_pct),
            ),
            Direction::Short => (
                entry_price * (1.0 + descriptor.sl_pct),
                entry_price * (1.0 - descriptor.tp_pct),
            ),
        };

        if let Err(err) = validate_signal(direction, entry_price, sl_price, Some(tp_price)) {
            warn!(%symbol, strategy_id = %strategy_id, ?err, "signal failed validity check, skipped");
            continue;
        }

        let max_leverage = cfg.leverage.iter().copied().max().unwrap_or(1).max(1) as u32;
        let leverage = validate_and_adjust_leverage(
            descriptor.sl_pct,
            descriptor.leverage,
            max_leverage,
            flow_risk::DEFAULT_LIQUIDATION_BUFFER,
        );

        let balance = venue.get_account_balance()?;
        let Some(size) = fixed_fractional_size(
            balance.available_margin,
            cfg.risk.fixed_fractional.risk_per_trade_pct,
            entry_price,
            sl_price,
        ) else {
            continue;
        };

        let now = Utc::now();
        let day_id = (now.year() as u32) * 10_000 + now.month() * 100 + now.day();
        let reject_window_id = (now.timestamp() / 60) as u32;
        let equity_micros = (balance.equity * MICROS_SCALE as f64) as i64;

        let decision = flow_risk::evaluate(
            &risk_config_from(cfg, balance.equity),
            risk_state,
            &RiskInput {
                day_id,
                equity_micros,
                reject_window_id,
                request: RequestKind::NewOrder,
                is_risk_reducing: false,
                kill_switch: None,
            },
        );

        if decision.action != flow_risk::RiskAction::Allow {
            info!(%symbol, strategy_id = %strategy_id, ?decision.action, ?decision.reason, "risk validator blocked entry");
            risk_state.record_reject(reject_window_id);
            continue;
        }

        let trade_side = match descriptor.direction {
            Direction::Long => TradeSide::Long,
            Direction::Short => TradeSide::Short,
        };
        venue.set_leverage(symbol, leverage)?;
        let (entry_ack, sl_ack, _tp_ack) = venue.place_order_with_sl_tp(symbol, trade_side, size, sl_price, tp_price)?;

        let normalized = normalize_symbol(symbol);
        trailing.register(
            PositionKey::new(normalized.clone(), "default"),
            trade_side,
            entry_price,
            size,
            sl_price,
            sl_ack.order_id,
            trailing_config_from(cfg, descriptor.sl_pct),
        );

        audit.record_transition(strategy_id, "LIVE", "LIVE", Some(&format!("entry {symbol} {}", entry_ack.order_id)))?;
        info!(strategy_id = %strategy_id, %symbol, order_id = %entry_ack.order_id, leverage, size, "live entry placed");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    flow_cli::load_dotenv();
    flow_cli::init_tracing();
    let args = Args::parse();
    let loaded = {
        let refs: Vec<&str> = args.common.config_paths.iter().map(|s| s.as_str()).collect();
        flow_config::load_layered_yaml(&refs)?
    };
    let cfg = loaded.pipeline_config()?;

    let mode = std::env::var("FLOW_MODE").unwrap_or_else(|_| "PAPER".to_string());
    let _secrets = flow_config::secrets::resolve_secrets_for_mode(&loaded.config_json, &mode)?;

    let db = flow_db::connect_from_env().await?;
    flow_db::migrate(&db).await?;
    let cache = CacheReader::new(&args.cache_dir)?;
    let venue = PaperBroker::new(cfg.backtesting.initial_capital);
    let trailing = TrailingBook::new();
    let loader = NativeLoader::new();
    let mut audit = flow_audit::AuditWriter::new(&args.audit_log, true)?;

    let credentials = flow_db::credentials::list_all(&db).await?;
    let subaccount = select_subaccount(&credentials, Utc::now());
    info!(subaccount_id = subaccount.map(|c| c.subaccount_id), mode, "executor starting");

    let mut risk_state = RiskState::new(0, (cfg.backtesting.initial_capital * MICROS_SCALE as f64) as i64, 0);
    let process_id = format!("executor-{}", Uuid::new_v4());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => { info!("executor received SIGINT, shutting down"); break; }
            _ = sigterm.recv() => { info!("executor received SIGTERM, shutting down"); break; }
            claimed = claim::claim(&db, StrategyStatus::Live, &process_id, ClaimOrder::Rework) => {
                match claimed? {
                    None => tokio::time::sleep(Duration::from_secs(args.idle_poll_secs)).await,
                    Some(row) => {
                        let strategy = row.strategy;
                        let timeframe = strategy.optimal_timeframe.unwrap_or(strategy.timeframe);
                        let pairs = strategy.backtest_pairs.clone().unwrap_or_default();

                        let result = process_one_strategy(
                            &db, &cache, &loader, &venue, &trailing, &cfg, &mut risk_state, &mut audit,
                            strategy.id, &strategy.name, &strategy.code, timeframe, &pairs,
                        ).await;

                        if let Err(err) = result {
                            warn!(strategy_id = %strategy.id, error = %err, "live evaluation failed, position left untouched");
                        }

                        for pos in venue.get_positions()? {
                            let key = PositionKey::new(normalize_symbol(&pos.symbol), "default");
                            let executor = VenueStopExecutor { venue: &venue };
                            trailing.on_price_update(&key, pos.entry_price, &executor)?;
                        }

                        claim::release(&db, strategy.id, StrategyStatus::Live).await?;
                    }
                }
            }
        }
    }

    let released = claim::release_all_by_process(&db, &process_id).await?;
    info!(released, "executor shutting down");
    Ok(())
}
