use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;

pub mod consumption;
pub mod secrets;

use flow_schemas::Timeframe;

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

impl LoadedConfig {
    /// Parse the typed, hard-required configuration surface out of the
    /// merged JSON. Every key named in the configuration surface must be
    /// present; a missing key is an init error, never a silent default.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        PipelineConfig::from_json(&self.config_json)
    }
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

// ---------------------------------------------------------------------------
// Hard-required-key accessors. No key here ever falls back to a default;
// a missing or mistyped key is a fatal init error (spec's explicit
// redesign flag: the original's silent-default config lookups are not
// carried forward).
// ---------------------------------------------------------------------------

fn req<'a>(v: &'a Value, pointer: &str) -> Result<&'a Value> {
    v.pointer(pointer)
        .with_context(|| format!("CONFIG_MISSING: required key '{pointer}' is absent"))
}

fn req_f64(v: &Value, pointer: &str) -> Result<f64> {
    req(v, pointer)?
        .as_f64()
        .with_context(|| format!("CONFIG_TYPE: '{pointer}' must be a number"))
}

fn req_u32(v: &Value, pointer: &str) -> Result<u32> {
    let n = req(v, pointer)?
        .as_u64()
        .with_context(|| format!("CONFIG_TYPE: '{pointer}' must be a non-negative integer"))?;
    u32::try_from(n).with_context(|| format!("CONFIG_RANGE: '{pointer}' does not fit in u32"))
}

fn req_i64(v: &Value, pointer: &str) -> Result<i64> {
    req(v, pointer)?
        .as_i64()
        .with_context(|| format!("CONFIG_TYPE: '{pointer}' must be an integer"))
}

fn req_bool(v: &Value, pointer: &str) -> Result<bool> {
    req(v, pointer)?
        .as_bool()
        .with_context(|| format!("CONFIG_TYPE: '{pointer}' must be a boolean"))
}

fn req_f64_array(v: &Value, pointer: &str) -> Result<Vec<f64>> {
    req(v, pointer)?
        .as_array()
        .with_context(|| format!("CONFIG_TYPE: '{pointer}' must be an array"))?
        .iter()
        .enumerate()
        .map(|(i, e)| {
            e.as_f64()
                .with_context(|| format!("CONFIG_TYPE: '{pointer}[{i}]' must be a number"))
        })
        .collect()
}

fn req_i64_array(v: &Value, pointer: &str) -> Result<Vec<i64>> {
    req(v, pointer)?
        .as_array()
        .with_context(|| format!("CONFIG_TYPE: '{pointer}' must be an array"))?
        .iter()
        .enumerate()
        .map(|(i, e)| {
            e.as_i64()
                .with_context(|| format!("CONFIG_TYPE: '{pointer}[{i}]' must be an integer"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Typed configuration surface (spec "Configuration surface" enumeration)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub backtesting: BacktestingConfig,
    pub active_pool: ActivePoolConfig,
    pub pipeline: PipelineOpsConfig,
    pub scorer_weights: ScorerWeights,
    pub risk: RiskConfig,
    pub parametric: HashMap<Timeframe, ParametricGrid>,
    pub leverage: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct BacktestingConfig {
    pub threads_validated: u32,
    pub threads_retest: u32,
    pub retest_interval_days: u32,
    pub thresholds: Thresholds,
    pub training_days: u32,
    pub holdout_days: u32,
    pub min_coverage_pct: f64,
    pub holdout: HoldoutConfig,
    pub initial_capital: f64,
    pub max_coins: u32,
}

#[derive(Debug, Clone)]
pub struct Thresholds {
    pub min_sharpe: f64,
    pub min_win_rate: f64,
    pub max_drawdown: f64,
    pub min_total_trades: u32,
    pub min_expectancy: f64,
}

#[derive(Debug, Clone)]
pub struct HoldoutConfig {
    pub max_degradation: f64,
    pub min_sharpe: f64,
    pub recency_weight: f64,
    pub min_trades: u32,
}

#[derive(Debug, Clone)]
pub struct ActivePoolConfig {
    pub max_size: u32,
    pub min_score_entry: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineOpsConfig {
    pub backpressure: BackpressureConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    pub base_cooldown: f64,
    pub cooldown_increment: f64,
    pub max_cooldown: f64,
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub log_interval: u32,
}

#[derive(Debug, Clone)]
pub struct ScorerWeights {
    pub expectancy: f64,
    pub sharpe: f64,
    pub win_rate: f64,
    pub drawdown: f64,
    pub recency: f64,
}

impl ScorerWeights {
    /// Must sum to 1.0 per the configuration surface; allow a small epsilon
    /// for floating point round-trip through YAML.
    pub fn validate(&self) -> Result<()> {
        let sum = self.expectancy + self.sharpe + self.win_rate + self.drawdown + self.recency;
        if (sum - 1.0).abs() > 1e-6 {
            bail!("CONFIG_INVALID: scorer.weights must sum to 1.0, got {sum}");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub fixed_fractional: FixedFractionalConfig,
    pub limits: RiskLimits,
    pub emergency: EmergencyConfig,
    pub trailing: TrailingRiskConfig,
}

#[derive(Debug, Clone)]
pub struct FixedFractionalConfig {
    pub risk_per_trade_pct: f64,
}

#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_open_positions_per_subaccount: u32,
}

#[derive(Debug, Clone)]
pub struct EmergencyConfig {
    pub max_portfolio_drawdown: f64,
    pub max_consecutive_losses: u32,
}

#[derive(Debug, Clone)]
pub struct TrailingRiskConfig {
    pub enabled: bool,
    pub min_adjustment_pct: f64,
    pub update_cooldown_sec: u32,
    pub breakeven_buffer_pct: f64,
}

#[derive(Debug, Clone)]
pub struct ParametricGrid {
    pub sl_pct: Vec<f64>,
    pub tp_pct: Vec<f64>,
    pub exit_bars: Vec<i64>,
}

impl ParametricGrid {
    /// Count of valid (sl_pct, tp_pct, exit_bars, leverage) combinations for
    /// a given leverage list. `tp_pct == 0 && exit_bars == 0` is invalid
    /// (neither take-profit nor a time exit bounds the trade) and is
    /// excluded at count time, per spec.
    pub fn valid_combination_count(&self, leverage: &[i64]) -> usize {
        let mut n = 0usize;
        for &tp in &self.tp_pct {
            for &eb in &self.exit_bars {
                if tp == 0.0 && eb == 0 {
                    continue;
                }
                n += self.sl_pct.len() * leverage.len();
            }
        }
        n
    }
}

const ALL_TIMEFRAMES: &[Timeframe] = &[
    Timeframe::M5,
    Timeframe::M15,
    Timeframe::M30,
    Timeframe::H1,
    Timeframe::H4,
    Timeframe::D1,
];

impl PipelineConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let backtesting = BacktestingConfig {
            threads_validated: req_u32(v, "/backtesting/threads/validated")?,
            threads_retest: req_u32(v, "/backtesting/threads/retest")?,
            retest_interval_days: req_u32(v, "/backtesting/retest/interval_days")?,
            thresholds: Thresholds {
                min_sharpe: req_f64(v, "/backtesting/thresholds/min_sharpe")?,
                min_win_rate: req_f64(v, "/backtesting/thresholds/min_win_rate")?,
                max_drawdown: req_f64(v, "/backtesting/thresholds/max_drawdown")?,
                min_total_trades: req_u32(v, "/backtesting/thresholds/min_total_trades")?,
                min_expectancy: req_f64(v, "/backtesting/thresholds/min_expectancy")?,
            },
            training_days: req_u32(v, "/backtesting/training_days")?,
            holdout_days: req_u32(v, "/backtesting/holdout_days")?,
            min_coverage_pct: req_f64(v, "/backtesting/min_coverage_pct")?,
            holdout: HoldoutConfig {
                max_degradation: req_f64(v, "/backtesting/holdout/max_degradation")?,
                min_sharpe: req_f64(v, "/backtesting/holdout/min_sharpe")?,
                recency_weight: req_f64(v, "/backtesting/holdout/recency_weight")?,
                min_trades: req_u32(v, "/backtesting/holdout/min_trades")?,
            },
            initial_capital: req_f64(v, "/backtesting/initial_capital")?,
            max_coins: req_u32(v, "/backtesting/max_coins")?,
        };

        let active_pool = ActivePoolConfig {
            max_size: req_u32(v, "/active_pool/max_size")?,
            min_score_entry: req_f64(v, "/active_pool/min_score_entry")?,
        };

        let pipeline = PipelineOpsConfig {
            backpressure: BackpressureConfig {
                base_cooldown: req_f64(v, "/pipeline/backpressure/base_cooldown")?,
                cooldown_increment: req_f64(v, "/pipeline/backpressure/cooldown_increment")?,
                max_cooldown: req_f64(v, "/pipeline/backpressure/max_cooldown")?,
            },
            monitoring: MonitoringConfig {
                log_interval: req_u32(v, "/pipeline/monitoring/log_interval")?,
            },
        };

        let scorer_weights = ScorerWeights {
            expectancy: req_f64(v, "/scorer/weights/expectancy")?,
            sharpe: req_f64(v, "/scorer/weights/sharpe")?,
            win_rate: req_f64(v, "/scorer/weights/win_rate")?,
            drawdown: req_f64(v, "/scorer/weights/drawdown")?,
            recency: req_f64(v, "/scorer/weights/recency")?,
        };
        scorer_weights.validate()?;

        let risk = RiskConfig {
            fixed_fractional: FixedFractionalConfig {
                risk_per_trade_pct: req_f64(v, "/risk/fixed_fractional/risk_per_trade_pct")?,
            },
            limits: RiskLimits {
                max_open_positions_per_subaccount: req_u32(
                    v,
                    "/risk/limits/max_open_positions_per_subaccount",
                )?,
            },
            emergency: EmergencyConfig {
                max_portfolio_drawdown: req_f64(v, "/risk/emergency/max_portfolio_drawdown")?,
                max_consecutive_losses: req_u32(v, "/risk/emergency/max_consecutive_losses")?,
            },
            trailing: TrailingRiskConfig {
                enabled: req_bool(v, "/risk/trailing/enabled")?,
                min_adjustment_pct: req_f64(v, "/risk/trailing/min_adjustment_pct")?,
                update_cooldown_sec: req_u32(v, "/risk/trailing/update_cooldown_sec")?,
                breakeven_buffer_pct: req_f64(v, "/risk/trailing/breakeven_buffer_pct")?,
            },
        };

        let leverage = req_i64_array(v, "/parametric/leverage")?;

        let mut parametric = HashMap::new();
        for tf in ALL_TIMEFRAMES {
            let base = format!("/parametric/timeframes/{}", tf.as_str());
            let grid = ParametricGrid {
                sl_pct: req_f64_array(v, &format!("{base}/sl_pct"))?,
                tp_pct: req_f64_array(v, &format!("{base}/tp_pct"))?,
                exit_bars: req_i64_array(v, &format!("{base}/exit_bars"))?,
            };
            parametric.insert(*tf, grid);
        }

        Ok(PipelineConfig {
            backtesting,
            active_pool,
            pipeline,
            scorer_weights,
            risk,
            parametric,
            leverage,
        })
    }
}
