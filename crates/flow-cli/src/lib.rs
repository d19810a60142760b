//! flow-cli
//!
//! Thin process entrypoints (spec §1-2's process→binary mapping): each
//! `[[bin]]` parses its config paths, wires the long-running loop from the
//! matching library crate, and runs until SIGINT/SIGTERM. Shared bootstrap
//! (tracing, env, config loading) lives here so every binary's `main.rs`
//! stays a few lines.

use anyhow::{Context, Result};
use clap::Parser;
use flow_config::PipelineConfig;

/// Common CLI surface every binary shares (spec §2's process→binary
/// mapping): every process takes no positional args, reading its config
/// path from `FLOW_CONFIG_PATH` (default `./config.yaml`). A
/// comma-separated path list layers multiple YAML files in merge order,
/// matching the teacher's `mqk run start --config a.yaml --config b.yaml`.
#[derive(Parser, Debug)]
pub struct CommonArgs {
    #[arg(long = "config", env = "FLOW_CONFIG_PATH", default_value = "./config.yaml", value_delimiter = ',')]
    pub config_paths: Vec<String>,
}

impl CommonArgs {
    pub fn load_pipeline_config(&self) -> Result<PipelineConfig> {
        let path_refs: Vec<&str> = self.config_paths.iter().map(|s| s.as_str()).collect();
        flow_config::load_layered_yaml(&path_refs)
            .context("load_layered_yaml failed")?
            .pipeline_config()
    }
}

/// `tracing_subscriber` with `EnvFilter`, exactly as the teacher's daemon
/// sets up in `init_tracing()`. `RUST_LOG` controls verbosity; defaults to
/// `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

/// `.env.local` bootstrap for dev-time DB URL / secrets, mirroring the
/// teacher's `mqk-cli` convention. Missing file is not an error.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
