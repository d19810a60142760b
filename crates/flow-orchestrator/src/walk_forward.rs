//! Walk-forward stability (spec §4.9 step 4): 4 expanding windows over the
//! optimal timeframe's bars, 75/25 train/test split per window. Stability is
//! the population std-dev of each window's out-of-sample expectancy —
//! skipped entirely for 1d/4h (too few bars to carve into four windows).

use std::collections::BTreeMap;

use anyhow::Result;
use flow_backtest::run_backtest;
use flow_cache::OhlcvBar;
use flow_schemas::Timeframe;
use flow_strategy::StrategyCapability;

const WINDOW_COUNT: usize = 4;
const TRAIN_RATIO: f64 = 0.75;
const MIN_VALID_WINDOWS: usize = 3;
const MIN_SYMBOLS_WITH_ENOUGH_BARS: usize = 5;
const MIN_BARS_PER_SYMBOL: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkForwardResult {
    pub stability: f64,
    pub valid_windows: usize,
}

/// 1d/4h timeframes don't carry enough bars over the backtest period to
/// form four meaningful expanding windows.
pub fn is_eligible(timeframe: Timeframe) -> bool {
    !matches!(timeframe, Timeframe::H4 | Timeframe::D1)
}

/// `Ok(None)` covers both "ineligible timeframe" and "fewer than
/// `MIN_VALID_WINDOWS` windows had enough data" — either way the caller
/// skips persisting a stability value rather than failing the strategy.
pub fn compute_walk_forward_stability(
    strategy: &dyn StrategyCapability,
    bars_by_symbol: &BTreeMap<String, Vec<OhlcvBar>>,
    timeframe: Timeframe,
    max_positions: Option<usize>,
    initial_equity: f64,
) -> Result<Option<WalkForwardResult>> {
    if !is_eligible(timeframe) {
        return Ok(None);
    }

    let mut expectancies = Vec::with_capacity(WINDOW_COUNT);

    for w in 1..=WINDOW_COUNT {
        let fraction = w as f64 / WINDOW_COUNT as f64;
        let mut test_bars: BTreeMap<String, Vec<OhlcvBar>> = BTreeMap::new();
        let mut symbols_with_enough_bars = 0usize;

        for (symbol, bars) in bars_by_symbol {
            let window_len = (bars.len() as f64 * fraction).round() as usize;
            if window_len == 0 {
                continue;
            }
            let window = &bars[..window_len.min(bars.len())];
            let split = (window.len() as f64 * TRAIN_RATIO).round() as usize;
            let test = &window[split.min(window.len())..];

            if test.len() >= MIN_BARS_PER_SYMBOL {
                symbols_with_enough_bars += 1;
            }
            if !test.is_empty() {
                test_bars.insert(symbol.clone(), test.to_vec());
            }
        }

        if symbols_with_enough_bars < MIN_SYMBOLS_WITH_ENOUGH_BARS {
            continue;
        }

        let metrics = run_backtest(strategy, &test_bars, timeframe, max_positions, MIN_BARS_PER_SYMBOL, initial_equity)?;
        if metrics.total_trades == 0 {
            continue;
        }
        expectancies.push(metrics.expectancy);
    }

    if expectancies.len() < MIN_VALID_WINDOWS {
        return Ok(None);
    }

    Ok(Some(WalkForwardResult {
        stability: population_stddev(&expectancies),
        valid_windows: expectancies.len(),
    }))
}

fn population_stddev(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_and_four_hour_timeframes_are_ineligible() {
        assert!(!is_eligible(Timeframe::D1));
        assert!(!is_eligible(Timeframe::H4));
        assert!(is_eligible(Timeframe::H1));
        assert!(is_eligible(Timeframe::M15));
    }

    #[test]
    fn population_stddev_of_identical_values_is_zero() {
        assert_eq!(population_stddev(&[0.02, 0.02, 0.02]), 0.0);
    }

    #[test]
    fn population_stddev_matches_hand_computation() {
        // mean=2, variance=((1-2)^2+(3-2)^2)/2=1, stddev=1
        assert_eq!(population_stddev(&[1.0, 3.0]), 1.0);
    }
}
