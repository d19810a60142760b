//! The strategy capability interface (spec §6, §9): the narrow surface the
//! rest of the pipeline needs from user-authored strategy code, independent
//! of how that code was loaded.

use std::collections::BTreeMap;

use anyhow::Result;
use flow_cache::OhlcvBar;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "long" => Some(Direction::Long),
            "short" => Some(Direction::Short),
            _ => None,
        }
    }
}

/// Class-level tunables a strategy carries (spec §6). These are the exact
/// fields the Parametric-Multiplier Promotion (§4.11) rewrites in place.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyDescriptor {
    pub sl_pct: f64,
    pub tp_pct: f64,
    pub leverage: u32,
    pub exit_after_bars: u32,
    pub direction: Direction,
    pub signal_column: String,
}

/// Per-bar indicator and signal columns, aligned 1:1 with the input bar
/// slice. `calculate_indicators` appends to this; the engine reads
/// `descriptor.signal_column` out of it to find entry bars.
#[derive(Clone, Debug, Default)]
pub struct IndicatorFrame {
    pub len: usize,
    pub columns: BTreeMap<String, Vec<f64>>,
    /// Entry signal per bar: `true` at an entry bar, aligned with `len`.
    pub entries: Vec<bool>,
}

impl IndicatorFrame {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: BTreeMap::new(),
            entries: vec![false; len],
        }
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }
}

/// The capability every loaded strategy object exposes. This is the one
/// place the rest of the pipeline touches user-supplied logic.
pub trait StrategyCapability: Send + Sync {
    fn descriptor(&self) -> StrategyDescriptor;

    /// Compute indicator columns and entry signals over `bars`. Must be
    /// pure: same bars in, same frame out.
    fn calculate_indicators(&self, bars: &[OhlcvBar]) -> Result<IndicatorFrame>;
}
