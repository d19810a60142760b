//! flow-validator: claims GENERATED strategies, runs the strategy loader as
//! a parse/load smoke test, and transitions to VALIDATED or deletes the row
//! on a LoaderError (spec §4.1, §7) — kept out of the orchestrator so a bad
//! `code` blob never occupies a backtest worker slot.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use flow_cli::CommonArgs;
use flow_db::claim::{self, ClaimOrder};
use flow_schemas::StrategyStatus;
use flow_strategy::{NativeLoader, StrategyLoader};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Append-only audit log path for status transitions.
    #[arg(long, default_value = "audit-validator.jsonl")]
    audit_log: String,

    /// Poll interval when no GENERATED work is available.
    #[arg(long, default_value_t = 2)]
    idle_poll_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    flow_cli::load_dotenv();
    flow_cli::init_tracing();
    let args = Args::parse();
    let _cfg = args.common.load_pipeline_config()?;

    let db = flow_db::connect_from_env().await?;
    flow_db::migrate(&db).await?;
    let mut audit = flow_audit::AuditWriter::new(&args.audit_log, true)?;
    let loader = NativeLoader::new();
    let process_id = format!("validator-{}", Uuid::new_v4());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            _ = sigterm.recv() => break,
            claimed = claim::claim(&db, StrategyStatus::Generated, &process_id, ClaimOrder::New) => {
                match claimed? {
                    None => tokio::time::sleep(Duration::from_secs(args.idle_poll_secs)).await,
                    Some(row) => {
                        let id = row.strategy.id;
                        match loader.load(&row.strategy.name, &row.strategy.code) {
                            Ok(_capability) => {
                                claim::release(&db, id, StrategyStatus::Validated).await?;
                                audit.record_transition(id, "GENERATED", "VALIDATED", None)?;
                                info!(strategy_id = %id, "validated");
                            }
                            Err(err) => {
                                let reason = format!("{err:#}");
                                claim::mark_failed(&db, id, &reason, true).await?;
                                audit.record_transition(id, "GENERATED", "DELETED", Some(&reason))?;
                                warn!(strategy_id = %id, error = %reason, "loader rejected strategy, row deleted");
                            }
                        }
                    }
                }
            }
        }
    }

    let released = claim::release_all_by_process(&db, &process_id).await?;
    info!(released, "validator shutting down");
    Ok(())
}
