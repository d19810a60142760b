//! Deterministic synthetic OHLCV bar generation, for tests that need a
//! `Vec<OhlcvBar>` without reading a real cache file (spec §4.2's
//! `CacheReader` is the only production bar source).

use chrono::{DateTime, Duration, Utc};
use flow_cache::OhlcvBar;

/// `count` hourly bars starting at `start`, walking `close` by a fixed
/// `step_pct` each bar (positive for an uptrend, negative for a downtrend).
/// `open`/`high`/`low` are derived from `close` with a small fixed spread so
/// every bar is well-formed (`low <= open,close <= high`).
pub fn synthetic_bars(start: DateTime<Utc>, count: usize, start_price: f64, step_pct: f64) -> Vec<OhlcvBar> {
    let mut bars = Vec::with_capacity(count);
    let mut close = start_price;

    for i in 0..count {
        let open = close;
        close *= 1.0 + step_pct;
        let high = open.max(close) * 1.001;
        let low = open.min(close) * 0.999;
        bars.push(OhlcvBar {
            timestamp: start + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        });
    }

    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_bars_are_strictly_ordered_and_well_formed() {
        let bars = synthetic_bars(Utc::now(), 10, 100.0, 0.01);
        assert_eq!(bars.len(), 10);
        for w in bars.windows(2) {
            assert!(w[0].timestamp < w[1].timestamp);
        }
        for bar in &bars {
            assert!(bar.low <= bar.open && bar.low <= bar.close);
            assert!(bar.high >= bar.open && bar.high >= bar.close);
        }
    }

    #[test]
    fn positive_step_pct_produces_an_uptrend() {
        let bars = synthetic_bars(Utc::now(), 5, 100.0, 0.02);
        assert!(bars.last().unwrap().close > bars.first().unwrap().close);
    }
}
