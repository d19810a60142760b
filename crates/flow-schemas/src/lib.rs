//! Shared data-model types for the strategy pipeline.
//!
//! These are plain structs with no database dependency: `flow-db` maps them
//! onto Postgres rows, but any crate that only needs to reason about shapes
//! (scoring, evaluation, the orchestrator) depends on this crate alone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse strategy family. Closed set — remapping is out-of-band (spec §9).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Trd,
    Mom,
    Rev,
    Vol,
    Cdl,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Trd => "TRD",
            StrategyKind::Mom => "MOM",
            StrategyKind::Rev => "REV",
            StrategyKind::Vol => "VOL",
            StrategyKind::Cdl => "CDL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TRD" => Some(StrategyKind::Trd),
            "MOM" => Some(StrategyKind::Mom),
            "REV" => Some(StrategyKind::Rev),
            "VOL" => Some(StrategyKind::Vol),
            "CDL" => Some(StrategyKind::Cdl),
            _ => None,
        }
    }
}

/// Closed set of supported timeframes (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "30m" => Some(Timeframe::M30),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }

    /// Seconds per bar; used for Sharpe annualization and walk-forward bar
    /// budgeting.
    pub fn secs(&self) -> i64 {
        match self {
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Walk-forward stability (spec §4.9 step 4) is skipped for 1d/4h: too
    /// few bars per expanding window to form enough valid windows.
    pub fn supports_walk_forward(&self) -> bool {
        !matches!(self, Timeframe::D1 | Timeframe::H4)
    }
}

/// The strategy lifecycle status graph (spec §1, §8).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Generated,
    Validated,
    Active,
    Live,
    Retired,
    Failed,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Generated => "GENERATED",
            StrategyStatus::Validated => "VALIDATED",
            StrategyStatus::Active => "ACTIVE",
            StrategyStatus::Live => "LIVE",
            StrategyStatus::Retired => "RETIRED",
            StrategyStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GENERATED" => Some(StrategyStatus::Generated),
            "VALIDATED" => Some(StrategyStatus::Validated),
            "ACTIVE" => Some(StrategyStatus::Active),
            "LIVE" => Some(StrategyStatus::Live),
            "RETIRED" => Some(StrategyStatus::Retired),
            "FAILED" => Some(StrategyStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationMode {
    Ai,
    Template,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Ai => "ai",
            GenerationMode::Template => "template",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ai" => Some(GenerationMode::Ai),
            "template" => Some(GenerationMode::Template),
            _ => None,
        }
    }
}

/// The concrete (sl_pct, tp_pct, leverage, exit_bars) tuple embedded in a
/// strategy's `code` (spec §3, §4.4).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamTuple {
    pub sl_pct: f64,
    pub tp_pct: f64,
    pub leverage: u32,
    pub exit_bars: u32,
}

impl ParamTuple {
    /// A tuple with neither a take-profit nor a time-exit can never close a
    /// trade on anything but the stop loss; the kernel's admission filter
    /// (spec §4.4) excludes this combination up front.
    pub fn is_valid(&self) -> bool {
        !(self.tp_pct == 0.0 && self.exit_bars == 0)
    }
}

/// Central strategy row (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Strategy {
    pub id: Uuid,
    pub name: String,
    pub kind: StrategyKind,
    pub timeframe: Timeframe,
    pub code: Vec<u8>,
    pub pattern_coins: Option<Vec<String>>,
    pub backtest_pairs: Option<Vec<String>>,
    pub optimal_timeframe: Option<Timeframe>,
    pub parameters: Option<ParamTuple>,
    pub status: StrategyStatus,
    pub processing_by: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub score_backtest: Option<f64>,
    pub score_live: Option<f64>,
    pub win_rate_live: Option<f64>,
    pub expectancy_live: Option<f64>,
    pub sharpe_live: Option<f64>,
    pub max_drawdown_live: Option<f64>,
    pub total_trades_live: Option<i64>,
    pub total_pnl_live: Option<Decimal>,
    pub last_live_update: Option<DateTime<Utc>>,
    pub live_degradation_pct: Option<f64>,
    pub last_backtested_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
    pub retired_reason: Option<String>,
    pub template_id: Option<Uuid>,
    pub pattern_ids: Option<Vec<Uuid>>,
    pub generation_mode: GenerationMode,
    pub parametric_backtest_metrics: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Strategy {
    /// Invariant: `status=ACTIVE` implies a scored, backtested row (spec §3).
    pub fn active_invariant_holds(&self) -> bool {
        if self.status != StrategyStatus::Active {
            return true;
        }
        self.score_backtest.is_some() && self.last_backtested_at.is_some()
    }

    /// Invariant: `status=LIVE` implies `optimal_timeframe` and
    /// `backtest_pairs` are set.
    pub fn live_invariant_holds(&self) -> bool {
        if self.status != StrategyStatus::Live {
            return true;
        }
        self.optimal_timeframe.is_some() && self.backtest_pairs.is_some()
    }
}

/// Training or holdout evaluation window (spec §3, §4.5).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodType {
    Training,
    Holdout,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Training => "training",
            PeriodType::Holdout => "holdout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "training" => Some(PeriodType::Training),
            "holdout" => Some(PeriodType::Holdout),
            _ => None,
        }
    }
}

/// One per (strategy, evaluation window, period_type) (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BacktestResult {
    pub id: Uuid,
    pub strategy_id: Uuid,
    pub period_type: PeriodType,
    pub period_days: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_trades: i64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub expectancy: f64,
    pub max_drawdown: f64,
    pub total_return_pct: f64,
    pub final_equity: Decimal,
    pub symbols_tested: Vec<String>,
    pub timeframe_tested: Timeframe,
    pub is_optimal_tf: bool,
    pub per_symbol_results: BTreeMap<String, f64>,
    pub recent_result_id: Option<Uuid>,
    pub weighted_sharpe: Option<f64>,
    pub weighted_sharpe_pure: Option<f64>,
    pub weighted_expectancy: Option<f64>,
    pub weighted_win_rate: Option<f64>,
    pub weighted_walk_forward_stability: Option<f64>,
    pub weighted_max_drawdown: Option<f64>,
    pub recency_ratio: Option<f64>,
    pub recency_penalty: Option<f64>,
    pub walk_forward_stability: Option<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Long => "long",
            TradeSide::Short => "short",
        }
    }
}

/// Realized execution record produced by the executor (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub strategy_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl_usd: Decimal,
    pub pnl_pct: f64,
}

/// Per-subaccount signing material (spec §3). The core treats the material
/// as opaque bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub subaccount_id: i64,
    pub signing_material: Vec<u8>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

/// Append-only observability row (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineMetricsSnapshot {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub queue_depths: BTreeMap<String, i64>,
    pub pool_utilization: f64,
}

/// Provenance row referenced by `strategies.template_id` (spec §3, §6).
/// Not itself enumerated in spec.md's field list, but required for the
/// foreign-key relationship spec §6 names.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StrategyTemplate {
    pub id: Uuid,
    pub name: String,
    pub family: StrategyKind,
    pub created_at: DateTime<Utc>,
}
