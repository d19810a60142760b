//! Parametric Kernel (spec §4.4): given one strategy's entry signals,
//! evaluate many (sl_pct, tp_pct, leverage, exit_bars) tuples in parallel
//! without re-running the strategy's indicator pass.

use std::collections::BTreeMap;

use anyhow::Result;
use flow_cache::OhlcvBar;
use flow_risk::{safe_leverage, DEFAULT_LIQUIDATION_BUFFER};
use flow_schemas::ParamTuple;
use flow_strategy::{Direction, StrategyCapability};
use rayon::prelude::*;

use crate::engine::dataset_span_days;
use crate::exits::simulate_first_touch_exit;
use crate::metrics::{compute_metrics, BacktestMetrics, TradeResult};

/// Hard admission thresholds applied to every evaluated tuple (spec §4.4).
#[derive(Clone, Debug, PartialEq)]
pub struct AdmissionCriteria {
    pub min_sharpe: f64,
    pub min_win_rate: f64,
    pub min_expectancy: f64,
    pub max_drawdown: f64,
    pub min_trades: usize,
}

/// Per-symbol venue leverage cap used for elementwise capping (spec §4.4).
pub type MaxLeverages = BTreeMap<String, u32>;

/// One tuple's outcome: the metrics bundle plus the tuple itself and its
/// parametric score.
#[derive(Clone, Debug, PartialEq)]
pub struct TupleResult {
    pub params: ParamTuple,
    pub metrics: BacktestMetrics,
    pub score: f64,
}

/// Evaluate every `candidate` tuple against `bars_by_symbol`, applying the
/// strategy's one indicator pass but substituting each tuple's own
/// sl_pct/tp_pct/leverage/exit_bars for the simulation. Invalid combinations
/// (`tp_pct == 0 && exit_bars == 0`) are excluded before evaluation.
///
/// Returns only admitted tuples (per `criteria`), sorted by parametric score
/// descending.
pub fn evaluate_parameter_space(
    strategy: &dyn StrategyCapability,
    bars_by_symbol: &BTreeMap<String, Vec<OhlcvBar>>,
    max_leverages: &MaxLeverages,
    candidates: &[ParamTuple],
    criteria: &AdmissionCriteria,
    min_bars: usize,
    initial_equity: f64,
) -> Result<Vec<TupleResult>> {
    let direction = strategy.descriptor().direction;

    let mut entries_by_symbol: BTreeMap<String, (Vec<OhlcvBar>, Vec<usize>)> = BTreeMap::new();
    for (symbol, bars) in bars_by_symbol {
        if bars.len() < min_bars {
            continue;
        }
        let frame = strategy.calculate_indicators(bars)?;
        let indices: Vec<usize> = frame
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, &e)| e.then_some(i))
            .collect();
        entries_by_symbol.insert(symbol.clone(), (bars.clone(), indices));
    }

    let span_days = dataset_span_days(bars_by_symbol);

    let valid: Vec<&ParamTuple> = candidates.iter().filter(|p| p.is_valid()).collect();

    let mut results: Vec<TupleResult> = valid
        .par_iter()
        .map(|&params| evaluate_one_tuple(direction, &entries_by_symbol, max_leverages, params, span_days, initial_equity))
        .filter(|result| admits(result, criteria))
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(results)
}

fn evaluate_one_tuple(
    direction: Direction,
    entries_by_symbol: &BTreeMap<String, (Vec<OhlcvBar>, Vec<usize>)>,
    max_leverages: &MaxLeverages,
    params: &ParamTuple,
    span_days: f64,
    initial_equity: f64,
) -> TupleResult {
    let mut trades: Vec<TradeResult> = Vec::new();

    for (symbol, (bars, indices)) in entries_by_symbol {
        let venue_cap = max_leverages.get(symbol).copied().unwrap_or(params.leverage);
        let liq_cap = safe_leverage(params.sl_pct, venue_cap, DEFAULT_LIQUIDATION_BUFFER);
        let effective_leverage = params.leverage.min(venue_cap).min(liq_cap);

        let mut open = false;
        for &entry_index in indices {
            if open {
                continue;
            }
            let Some(outcome) = simulate_first_touch_exit(
                bars,
                entry_index,
                direction,
                params.sl_pct,
                params.tp_pct,
                params.exit_bars,
            ) else {
                continue;
            };
            open = true;
            trades.push(TradeResult {
                symbol: symbol.clone(),
                entry_time: bars[entry_index].timestamp,
                exit_time: bars[outcome.exit_index].timestamp,
                pct_return: outcome.pct_return * effective_leverage as f64,
            });
            open = false;
        }
    }

    let metrics = compute_metrics(&trades, initial_equity, span_days);
    let score = parametric_score(&metrics);
    TupleResult {
        params: params.clone(),
        metrics,
        score,
    }
}

fn admits(result: &TupleResult, criteria: &AdmissionCriteria) -> bool {
    let m = &result.metrics;
    m.sharpe_ratio >= criteria.min_sharpe
        && m.win_rate >= criteria.min_win_rate
        && m.expectancy >= criteria.min_expectancy
        && m.max_drawdown <= criteria.max_drawdown
        && m.total_trades >= criteria.min_trades
}

/// Weighted combination of sharpe, expectancy, and drawdown (spec §4.4),
/// using the same clamp-then-normalize convention as the Scorer (§4.7).
fn parametric_score(m: &BacktestMetrics) -> f64 {
    let norm_sharpe = (m.sharpe_ratio / 3.0).clamp(0.0, 1.0);
    let norm_expectancy = (m.expectancy / 0.10).clamp(0.0, 1.0);
    let drawdown_component = 1.0 - m.max_drawdown.clamp(0.0, 1.0);
    0.5 * norm_sharpe + 0.3 * norm_expectancy + 0.2 * drawdown_component
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use flow_strategy::{IndicatorFrame, StrategyDescriptor};

    struct FixedStrategy {
        entries: Vec<bool>,
    }

    impl StrategyCapability for FixedStrategy {
        fn descriptor(&self) -> StrategyDescriptor {
            StrategyDescriptor {
                sl_pct: 0.05,
                tp_pct: 0.10,
                leverage: 1,
                exit_after_bars: 10,
                direction: Direction::Long,
                signal_column: "entry".into(),
            }
        }

        fn calculate_indicators(&self, bars: &[OhlcvBar]) -> Result<IndicatorFrame> {
            let mut frame = IndicatorFrame::new(bars.len());
            frame.entries = self.entries.clone();
            Ok(frame)
        }
    }

    fn make_bars(n: usize, start_price: f64, drift: f64) -> Vec<OhlcvBar> {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        (0..n)
            .map(|i| {
                let price = start_price + drift * i as f64;
                OhlcvBar {
                    timestamp: start + Duration::hours(i as i64),
                    open: price,
                    high: price * 1.01,
                    low: price * 0.99,
                    close: price,
                    volume: 1.0,
                }
            })
            .collect()
    }

    #[test]
    fn invalid_tp_zero_and_exit_zero_tuples_are_excluded() {
        let mut entries = vec![false; 150];
        entries[10] = true;
        let strategy = FixedStrategy { entries };
        let mut bars_by_symbol = BTreeMap::new();
        bars_by_symbol.insert("AAA".to_string(), make_bars(150, 100.0, 0.3));

        let candidates = vec![ParamTuple {
            sl_pct: 0.05,
            tp_pct: 0.0,
            leverage: 5,
            exit_bars: 0,
        }];
        let criteria = AdmissionCriteria {
            min_sharpe: -100.0,
            min_win_rate: 0.0,
            min_expectancy: -1.0,
            max_drawdown: 1.0,
            min_trades: 0,
        };
        let max_leverages = MaxLeverages::new();
        let results = evaluate_parameter_space(
            &strategy,
            &bars_by_symbol,
            &max_leverages,
            &candidates,
            &criteria,
            100,
            10_000.0,
        )
        .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn leverage_is_capped_by_venue_and_liquidation_safety() {
        let mut entries = vec![false; 150];
        entries[10] = true;
        let strategy = FixedStrategy { entries };
        let mut bars_by_symbol = BTreeMap::new();
        bars_by_symbol.insert("AAA".to_string(), make_bars(150, 100.0, 0.3));

        let candidates = vec![ParamTuple {
            sl_pct: 0.12,
            tp_pct: 0.08,
            leverage: 20,
            exit_bars: 5,
        }];
        let criteria = AdmissionCriteria {
            min_sharpe: -100.0,
            min_win_rate: 0.0,
            min_expectancy: -1.0,
            max_drawdown: 1.0,
            min_trades: 0,
        };
        let mut max_leverages = MaxLeverages::new();
        max_leverages.insert("AAA".to_string(), 40);

        let results = evaluate_parameter_space(
            &strategy,
            &bars_by_symbol,
            &max_leverages,
            &candidates,
            &criteria,
            100,
            10_000.0,
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        // safe_leverage(0.12, 40, 0.10) == 6 per the documented example
        assert_eq!(results[0].metrics.total_trades, 1);
    }

    #[test]
    fn results_sorted_by_score_descending() {
        let mut entries = vec![false; 150];
        entries[10] = true;
        let strategy = FixedStrategy { entries };
        let mut bars_by_symbol = BTreeMap::new();
        bars_by_symbol.insert("AAA".to_string(), make_bars(150, 100.0, 0.5));

        let candidates = vec![
            ParamTuple {
                sl_pct: 0.05,
                tp_pct: 0.01,
                leverage: 1,
                exit_bars: 0,
            },
            ParamTuple {
                sl_pct: 0.05,
                tp_pct: 0.20,
                leverage: 1,
                exit_bars: 0,
            },
        ];
        let criteria = AdmissionCriteria {
            min_sharpe: -100.0,
            min_win_rate: 0.0,
            min_expectancy: -1.0,
            max_drawdown: 1.0,
            min_trades: 0,
        };
        let max_leverages = MaxLeverages::new();
        let results = evaluate_parameter_space(
            &strategy,
            &bars_by_symbol,
            &max_leverages,
            &candidates,
            &criteria,
            100,
            10_000.0,
        )
        .unwrap();
        for w in results.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }
}
