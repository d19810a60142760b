//! Aggregate metrics shared by the single-tuple engine (§4.3) and the
//! parametric kernel (§4.4) — same definitions, same formulas.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// One realized trade, already direction- and leverage-adjusted so
/// `pct_return` is a fraction of allocated equity.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeResult {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pct_return: f64,
}

/// The metrics bundle produced by a backtest run (spec §4.3).
#[derive(Clone, Debug, PartialEq)]
pub struct BacktestMetrics {
    pub total_trades: usize,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub expectancy: f64,
    pub max_drawdown: f64,
    pub total_return: f64,
    pub final_equity: f64,
    pub symbol_breakdown: BTreeMap<String, f64>,
}

/// Compute the metrics bundle from a trade list and the dataset's calendar
/// span (used for Sharpe annualization). `trades` need not be pre-sorted.
pub fn compute_metrics(trades: &[TradeResult], initial_equity: f64, span_days: f64) -> BacktestMetrics {
    let mut sorted: Vec<&TradeResult> = trades.iter().collect();
    sorted.sort_by(|a, b| a.exit_time.cmp(&b.exit_time).then_with(|| a.symbol.cmp(&b.symbol)));

    let total_trades = sorted.len();

    if total_trades == 0 {
        return BacktestMetrics {
            total_trades: 0,
            win_rate: 0.0,
            sharpe_ratio: 0.0,
            expectancy: 0.0,
            max_drawdown: 0.0,
            total_return: 0.0,
            final_equity: initial_equity,
            symbol_breakdown: BTreeMap::new(),
        };
    }

    let wins: Vec<f64> = sorted.iter().map(|t| t.pct_return).filter(|r| *r > 0.0).copied().collect();
    let losses: Vec<f64> = sorted.iter().map(|t| t.pct_return).filter(|r| *r <= 0.0).copied().collect();

    let win_rate = wins.len() as f64 / total_trades as f64;
    let avg_win_pct = if wins.is_empty() { 0.0 } else { wins.iter().sum::<f64>() / wins.len() as f64 };
    let avg_loss_pct = if losses.is_empty() {
        0.0
    } else {
        losses.iter().map(|r| r.abs()).sum::<f64>() / losses.len() as f64
    };
    let expectancy = win_rate * avg_win_pct - (1.0 - win_rate) * avg_loss_pct;

    let mut equity = initial_equity;
    let mut peak = initial_equity;
    let mut max_drawdown = 0.0f64;
    for t in &sorted {
        equity *= 1.0 + t.pct_return;
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let drawdown = (peak - equity) / peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }
    let final_equity = equity;
    let total_return = (final_equity - initial_equity) / initial_equity;

    let sharpe_ratio = if total_trades < 2 || span_days <= 0.0 {
        0.0
    } else {
        let trades_per_day = total_trades as f64 / span_days;
        let returns: Vec<f64> = sorted.iter().map(|t| t.pct_return).collect();
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
        let stddev = variance.sqrt();
        if stddev == 0.0 {
            0.0
        } else {
            (mean / stddev) * (365.0 * trades_per_day).sqrt()
        }
    };

    let mut per_symbol: BTreeMap<String, Vec<&TradeResult>> = BTreeMap::new();
    for t in &sorted {
        per_symbol.entry(t.symbol.clone()).or_default().push(t);
    }
    let symbol_breakdown = per_symbol
        .into_iter()
        .map(|(symbol, trades)| {
            let compounded = trades.iter().fold(1.0, |acc, t| acc * (1.0 + t.pct_return));
            (symbol, compounded - 1.0)
        })
        .collect();

    BacktestMetrics {
        total_trades,
        win_rate,
        sharpe_ratio,
        expectancy,
        max_drawdown,
        total_return,
        final_equity,
        symbol_breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(symbol: &str, day: i64, pct_return: f64) -> TradeResult {
        TradeResult {
            symbol: symbol.to_string(),
            entry_time: Utc.timestamp_opt(day * 86_400, 0).unwrap(),
            exit_time: Utc.timestamp_opt(day * 86_400 + 3600, 0).unwrap(),
            pct_return,
        }
    }

    #[test]
    fn no_trades_yields_flat_zero_metrics() {
        let m = compute_metrics(&[], 10_000.0, 30.0);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.final_equity, 10_000.0);
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn expectancy_matches_definition() {
        let trades = vec![t("BTC", 0, 0.10), t("BTC", 1, -0.05), t("BTC", 2, 0.10), t("BTC", 3, -0.05)];
        let m = compute_metrics(&trades, 1_000.0, 10.0);
        // win_rate=0.5, avg_win=0.10, avg_loss=0.05
        // expectancy = 0.5*0.10 - 0.5*0.05 = 0.025
        assert!((m.expectancy - 0.025).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_is_positive_fraction_of_running_peak() {
        let trades = vec![t("BTC", 0, 0.20), t("BTC", 1, -0.25)];
        let m = compute_metrics(&trades, 1_000.0, 10.0);
        // equity: 1000 -> 1200 -> 900, peak 1200, drawdown = 300/1200 = 0.25
        assert!((m.max_drawdown - 0.25).abs() < 1e-9);
    }

    #[test]
    fn sharpe_zero_with_fewer_than_two_trades() {
        let trades = vec![t("BTC", 0, 0.05)];
        let m = compute_metrics(&trades, 1_000.0, 10.0);
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn sharpe_zero_with_undefined_span() {
        let trades = vec![t("BTC", 0, 0.05), t("BTC", 1, 0.03)];
        let m = compute_metrics(&trades, 1_000.0, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn symbol_breakdown_compounds_per_symbol_returns() {
        let trades = vec![t("BTC", 0, 0.10), t("BTC", 1, 0.10), t("ETH", 0, -0.05)];
        let m = compute_metrics(&trades, 1_000.0, 10.0);
        let btc = m.symbol_breakdown["BTC"];
        assert!((btc - (1.1 * 1.1 - 1.0)).abs() < 1e-9);
        let eth = m.symbol_breakdown["ETH"];
        assert!((eth - (-0.05)).abs() < 1e-9);
    }

    #[test]
    fn total_return_reflects_compounded_equity() {
        let trades = vec![t("BTC", 0, 0.10), t("BTC", 1, 0.10)];
        let m = compute_metrics(&trades, 1_000.0, 10.0);
        assert!((m.final_equity - 1_210.0).abs() < 1e-6);
        assert!((m.total_return - 0.21).abs() < 1e-9);
    }
}
