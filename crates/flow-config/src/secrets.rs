//! Secret resolution for the execution adapter.
//!
//! Config YAML stores only **env var NAMES**; callers invoke
//! [`resolve_secrets_for_mode`] once at startup and pass the resolved struct
//! into the execution adapter's constructor. `Debug` redacts every value;
//! error messages reference the env var NAME, never the value.
//!
//! The pipeline's Credential entity (spec §3) is the primary source of
//! signing material for the executor — it is read per-subaccount from
//! `flow_db::credentials::find_active`. The env-var path here covers the
//! process-wide defaults used when no DB-backed credential row applies yet
//! (e.g. a first-run paper account) and mirrors the mode-aware enforcement
//! the teacher's loader used for its broker/market-data keys.

use anyhow::{bail, Result};
use serde_json::Value;

/// Hyperliquid-style signing material resolved from the environment.
///
/// `Debug` redacts every field — never log this struct's contents directly.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Wallet private key used to sign orders. Required outside BACKTEST.
    pub wallet_private_key: Option<String>,
    /// Optional API wallet address (agent wallet) distinct from the
    /// funding wallet.
    pub api_wallet_address: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "wallet_private_key",
                &self.wallet_private_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "api_wallet_address",
                &self.api_wallet_address.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

struct SecretEnvNames {
    wallet_private_key_var: String,
    api_wallet_address_var: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        wallet_private_key_var: read_str_at(config_json, "/venue/keys_env/wallet_private_key")
            .unwrap_or_else(|| "FLOW_WALLET_PRIVATE_KEY".to_string()),
        api_wallet_address_var: read_str_at(config_json, "/venue/keys_env/api_wallet_address")
            .unwrap_or_else(|| "FLOW_API_WALLET_ADDRESS".to_string()),
    }
}

/// Resolve execution-adapter secrets from the environment for the given
/// `mode` string (case-insensitive: `"LIVE"`, `"PAPER"`, or `"BACKTEST"`).
///
/// `LIVE` and `PAPER` require a wallet private key; `BACKTEST` requires
/// nothing (the execution adapter is never constructed in that mode).
pub fn resolve_secrets_for_mode(config_json: &Value, mode: &str) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);
    let mode_upper = mode.trim().to_ascii_uppercase();

    let wallet_private_key = resolve_env(&names.wallet_private_key_var);
    let api_wallet_address = resolve_env(&names.api_wallet_address_var);

    match mode_upper.as_str() {
        "LIVE" | "PAPER" => {
            if wallet_private_key.is_none() {
                bail!(
                    "SECRETS_MISSING mode={mode_upper}: required env var '{}' \
                     (wallet private key) is not set or empty",
                    names.wallet_private_key_var,
                );
            }
        }
        "BACKTEST" => {}
        other => {
            bail!(
                "SECRETS_UNKNOWN_MODE: unrecognised mode '{other}'; \
                 expected one of: LIVE | PAPER | BACKTEST",
            );
        }
    }

    Ok(ResolvedSecrets {
        wallet_private_key,
        api_wallet_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtest_mode_never_requires_secrets() {
        let cfg = serde_json::json!({});
        let resolved = resolve_secrets_for_mode(&cfg, "backtest").unwrap();
        assert!(resolved.wallet_private_key.is_none());
    }

    #[test]
    fn live_mode_rejects_missing_wallet_key() {
        std::env::remove_var("FLOW_WALLET_PRIVATE_KEY");
        let cfg = serde_json::json!({});
        let err = resolve_secrets_for_mode(&cfg, "LIVE").unwrap_err();
        assert!(err.to_string().contains("SECRETS_MISSING"));
    }
}
