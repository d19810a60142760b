//! Backtest Engine (spec §4.3): simulates a shared-capital portfolio with a
//! bounded number of concurrent positions against one strategy's entry
//! signals.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use flow_cache::OhlcvBar;
use flow_schemas::Timeframe;
use flow_strategy::StrategyCapability;

use crate::exits::simulate_first_touch_exit;
use crate::metrics::{compute_metrics, BacktestMetrics, TradeResult};

/// Default minimum bar count for a symbol to be included in a backtest.
pub const DEFAULT_MIN_BARS: usize = 100;
/// Lower minimum bar count used for holdout/walk-forward windows (§4.3).
pub const HOLDOUT_MIN_BARS: usize = 20;

/// A single candidate entry signal, carrying enough to order and simulate
/// it without re-touching the strategy.
struct CandidateSignal {
    symbol: String,
    bar_index: usize,
    timestamp: DateTime<Utc>,
}

/// Run the backtest engine over `bars_by_symbol` for one strategy.
///
/// `max_positions`, when set, bounds the number of concurrent open
/// positions; signals beyond that bound are skipped, not queued. Tie-break
/// order for admission is deterministic: signal timestamp ascending, then
/// symbol ascending (spec §4.3).
pub fn run_backtest(
    strategy: &dyn StrategyCapability,
    bars_by_symbol: &BTreeMap<String, Vec<OhlcvBar>>,
    _timeframe: Timeframe,
    max_positions: Option<usize>,
    min_bars: usize,
    initial_equity: f64,
) -> Result<BacktestMetrics> {
    let descriptor = strategy.descriptor();

    let mut candidates: Vec<CandidateSignal> = Vec::new();
    let mut frames = BTreeMap::new();

    for (symbol, bars) in bars_by_symbol {
        if bars.len() < min_bars {
            continue;
        }
        let frame = strategy.calculate_indicators(bars)?;
        for (i, &is_entry) in frame.entries.iter().enumerate() {
            if is_entry {
                candidates.push(CandidateSignal {
                    symbol: symbol.clone(),
                    bar_index: i,
                    timestamp: bars[i].timestamp,
                });
            }
        }
        frames.insert(symbol.clone(), frame);
    }

    candidates.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.symbol.cmp(&b.symbol)));

    let span_days = dataset_span_days(bars_by_symbol);

    // Open positions, each occupying a slot from its entry until `exit_time`.
    // Freed only once a later-processed candidate's timestamp has passed that
    // exit — models real overlap between an entry's open time and its exit,
    // rather than resolving each signal to completion before the next.
    struct OpenPosition {
        symbol: String,
        exit_time: DateTime<Utc>,
    }
    let mut open_positions: Vec<OpenPosition> = Vec::new();
    let mut trades: Vec<TradeResult> = Vec::new();

    for signal in &candidates {
        open_positions.retain(|p| p.exit_time > signal.timestamp);

        if open_positions.iter().any(|p| p.symbol == signal.symbol) {
            continue;
        }
        if let Some(cap) = max_positions {
            if open_positions.len() >= cap {
                continue;
            }
        }

        let bars = &bars_by_symbol[&signal.symbol];
        let Some(outcome) = simulate_first_touch_exit(
            bars,
            signal.bar_index,
            descriptor.direction,
            descriptor.sl_pct,
            descriptor.tp_pct,
            descriptor.exit_after_bars,
        ) else {
            continue;
        };

        let exit_time = bars[outcome.exit_index].timestamp;
        open_positions.push(OpenPosition { symbol: signal.symbol.clone(), exit_time });
        let leveraged_return = outcome.pct_return * descriptor.leverage as f64;
        trades.push(TradeResult {
            symbol: signal.symbol.clone(),
            entry_time: bars[signal.bar_index].timestamp,
            exit_time,
            pct_return: leveraged_return,
        });
    }

    Ok(compute_metrics(&trades, initial_equity, span_days))
}

pub(crate) fn dataset_span_days(bars_by_symbol: &BTreeMap<String, Vec<OhlcvBar>>) -> f64 {
    let mut earliest: Option<DateTime<Utc>> = None;
    let mut latest: Option<DateTime<Utc>> = None;
    for bars in bars_by_symbol.values() {
        if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
            earliest = Some(earliest.map_or(first.timestamp, |e| e.min(first.timestamp)));
            latest = Some(latest.map_or(last.timestamp, |l| l.max(last.timestamp)));
        }
    }
    match (earliest, latest) {
        (Some(e), Some(l)) => (l - e).num_seconds() as f64 / 86_400.0,
        _ => 0.0,
    }
}
