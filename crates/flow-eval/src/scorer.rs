//! Scorer (spec §4.7): two faces computing the same normalized formula —
//! `BacktestScorer` reads a persisted `BacktestResult`'s `weighted_*`
//! fields, `LiveScorer` derives the same quantities from closed trades.
//!
//! `norm(robustness)` is read from `BacktestResult::walk_forward_stability`
//! clamped to `[0, 1]` — the spec names the input but not its bounds, and
//! walk-forward stability is already expressed on a 0-1 scale upstream.

use flow_schemas::{BacktestResult, Trade};

/// Weights from the score formula (spec §4.7).
const W_EXPECTANCY: f64 = 0.35;
const W_SHARPE: f64 = 0.20;
const W_WIN_RATE: f64 = 0.10;
const W_INV_DRAWDOWN: f64 = 0.15;
const W_ROBUSTNESS: f64 = 0.10;
const W_RECENCY: f64 = 0.10;

fn norm_expectancy(expectancy: f64) -> f64 {
    expectancy.clamp(0.0, 0.10) / 0.10
}

fn norm_sharpe(sharpe: f64) -> f64 {
    sharpe.clamp(0.0, 3.0) / 3.0
}

fn norm_inv_drawdown(max_drawdown: f64) -> f64 {
    (1.0 - max_drawdown / 0.30).max(0.0)
}

fn norm_robustness(walk_forward_stability: f64) -> f64 {
    walk_forward_stability.clamp(0.0, 1.0)
}

fn recency_from_degradation(degradation: f64) -> f64 {
    (0.5 - degradation).clamp(0.0, 1.0)
}

fn score_norm(expectancy: f64, sharpe: f64, win_rate: f64, max_drawdown: f64, robustness: f64, degradation: f64) -> f64 {
    let s = W_EXPECTANCY * norm_expectancy(expectancy)
        + W_SHARPE * norm_sharpe(sharpe)
        + W_WIN_RATE * win_rate
        + W_INV_DRAWDOWN * norm_inv_drawdown(max_drawdown)
        + W_ROBUSTNESS * norm_robustness(robustness)
        + W_RECENCY * recency_from_degradation(degradation);
    s * 100.0
}

/// Score a persisted training `BacktestResult` using its paired `weighted_*`
/// metrics, falling back to the raw metric when no weighted value was
/// computed (e.g. a fresh row with no recency history yet).
pub fn score_from_backtest_result(result: &BacktestResult, degradation: f64) -> f64 {
    let expectancy = result.weighted_expectancy.unwrap_or(result.expectancy);
    let sharpe = result.weighted_sharpe.unwrap_or(result.sharpe_ratio);
    let win_rate = result.weighted_win_rate.unwrap_or(result.win_rate);
    let max_drawdown = result.weighted_max_drawdown.unwrap_or(result.max_drawdown);
    let robustness = result.walk_forward_stability.unwrap_or(0.0);
    score_norm(expectancy, sharpe, win_rate, max_drawdown, robustness, degradation)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiveScoreError {
    /// Fewer than `min_trades` closed trades — no score at all.
    InsufficientTrades,
    /// Enough trades to score expectancy/win-rate, but not enough density
    /// (trades and days) to annualize Sharpe meaningfully.
    InsufficientFrequencyData,
}

/// Live scoring thresholds (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveScorerConfig {
    pub min_trades: usize,
    pub min_trades_for_frequency: usize,
    pub min_days_for_frequency: f64,
    pub max_drawdown_scale: f64,
}

impl Default for LiveScorerConfig {
    fn default() -> Self {
        Self {
            min_trades: 10,
            min_trades_for_frequency: 30,
            min_days_for_frequency: 14.0,
            max_drawdown_scale: 0.30,
        }
    }
}

/// Score a strategy's closed-trade history (spec §4.7's `LiveScorer`).
///
/// Sharpe is annualized by the strategy's actual trades/day, matching the
/// backtest engine's convention. `degradation` is carried over from the
/// strategy's last holdout validation (live scoring has no holdout of its
/// own to degrade against).
pub fn score_from_trades(trades: &[Trade], degradation: f64, cfg: &LiveScorerConfig) -> Result<f64, LiveScoreError> {
    if trades.len() < cfg.min_trades {
        return Err(LiveScoreError::InsufficientTrades);
    }

    let mut sorted: Vec<&Trade> = trades.iter().collect();
    sorted.sort_by(|a, b| a.exit_time.cmp(&b.exit_time));

    let span_days = (sorted.last().unwrap().exit_time - sorted.first().unwrap().exit_time).num_seconds() as f64 / 86_400.0;

    if sorted.len() < cfg.min_trades_for_frequency || span_days < cfg.min_days_for_frequency {
        return Err(LiveScoreError::InsufficientFrequencyData);
    }

    let returns: Vec<f64> = sorted.iter().map(|t| t.pnl_pct).collect();
    let wins: Vec<f64> = returns.iter().filter(|r| **r > 0.0).copied().collect();
    let losses: Vec<f64> = returns.iter().filter(|r| **r <= 0.0).copied().collect();

    let win_rate = wins.len() as f64 / returns.len() as f64;
    let avg_win = if wins.is_empty() { 0.0 } else { wins.iter().sum::<f64>() / wins.len() as f64 };
    let avg_loss = if losses.is_empty() { 0.0 } else { losses.iter().map(|r| r.abs()).sum::<f64>() / losses.len() as f64 };
    let expectancy = win_rate * avg_win - (1.0 - win_rate) * avg_loss;

    let trades_per_day = returns.len() as f64 / span_days;
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let stddev = variance.sqrt();
    let sharpe = if stddev == 0.0 { 0.0 } else { (mean / stddev) * (365.0 * trades_per_day).sqrt() };

    let mut equity = 1.0f64;
    let mut peak = 1.0f64;
    let mut max_drawdown = 0.0f64;
    for r in &returns {
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }
    }

    // `robustness` has no live-trade analogue; the strategy's last stored
    // walk-forward stability carries forward via `degradation` only.
    Ok(score_norm(expectancy, sharpe, win_rate, max_drawdown, 0.0, degradation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use flow_schemas::TradeSide;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn trade(day: i64, pnl_pct: f64) -> Trade {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        Trade {
            id: Uuid::nil(),
            strategy_id: Uuid::nil(),
            symbol: "BTCUSDT".to_string(),
            side: TradeSide::Long,
            entry_time: start + Duration::days(day),
            exit_time: start + Duration::days(day) + Duration::hours(1),
            pnl_usd: Decimal::new(0, 0),
            pnl_pct,
        }
    }

    #[test]
    fn below_min_trades_is_insufficient() {
        let trades = vec![trade(0, 0.01); 5];
        let cfg = LiveScorerConfig { min_trades: 10, ..Default::default() };
        assert_eq!(score_from_trades(&trades, 0.0, &cfg), Err(LiveScoreError::InsufficientTrades));
    }

    #[test]
    fn thin_frequency_data_is_insufficient() {
        let trades: Vec<Trade> = (0..35).map(|i| trade(i % 3, 0.01)).collect();
        let cfg = LiveScorerConfig {
            min_trades: 10,
            min_trades_for_frequency: 30,
            min_days_for_frequency: 14.0,
            ..Default::default()
        };
        assert_eq!(score_from_trades(&trades, 0.0, &cfg), Err(LiveScoreError::InsufficientFrequencyData));
    }

    #[test]
    fn sufficient_history_yields_a_bounded_score() {
        let trades: Vec<Trade> = (0..40).map(|i| trade(i, if i % 3 == 0 { -0.01 } else { 0.02 })).collect();
        let cfg = LiveScorerConfig::default();
        let score = score_from_trades(&trades, 0.0, &cfg).unwrap();
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn norm_functions_clamp_at_their_bounds() {
        assert_eq!(norm_expectancy(1.0), 1.0);
        assert_eq!(norm_expectancy(-1.0), 0.0);
        assert_eq!(norm_sharpe(10.0), 1.0);
        assert_eq!(norm_inv_drawdown(1.0), 0.0);
        assert_eq!(recency_from_degradation(-1.0), 1.0);
        assert_eq!(recency_from_degradation(1.0), 0.0);
    }
}
