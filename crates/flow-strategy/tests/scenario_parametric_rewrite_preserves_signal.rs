//! Parametric-Multiplier Promotion (spec §4.11) rewrites only the four
//! class-level tunables; the indicator/signal definitions, and therefore the
//! entry signal a strategy produces over a fixed bar series, must be
//! unaffected by the rewrite.

use chrono::{Duration, Utc};
use flow_cache::OhlcvBar;
use flow_schemas::ParamTuple;
use flow_strategy::{rewrite_parameters, NativeLoader, StrategyLoader};

const CODE: &str = r#"
sl_pct = 0.05
tp_pct = 0.08
leverage = 10
exit_after_bars = 20
direction = long
signal_column = entry_signal

indicator fast = ema(close, 3)
indicator slow = ema(close, 9)
signal entry_signal = cross_above(fast, slow)
"#;

fn synthetic_bars() -> Vec<OhlcvBar> {
    let start = Utc::now();
    (0..40)
        .map(|i| {
            let price = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.2;
            OhlcvBar {
                timestamp: start + Duration::hours(i as i64),
                open: price,
                high: price + 0.5,
                low: price - 0.5,
                close: price,
                volume: 10.0,
            }
        })
        .collect()
}

#[test]
fn rewritten_strategy_yields_identical_entries() {
    let loader = NativeLoader::new();
    let bars = synthetic_bars();

    let original = loader.load("sample", CODE.as_bytes()).unwrap();
    let before = original.calculate_indicators(&bars).unwrap();

    let winning = ParamTuple {
        sl_pct: 0.02,
        tp_pct: 0.06,
        leverage: 3,
        exit_bars: 15,
    };
    let rewritten_code = rewrite_parameters(CODE, &winning).unwrap();
    let rewritten = loader.load("sample", rewritten_code.as_bytes()).unwrap();
    let after = rewritten.calculate_indicators(&bars).unwrap();

    assert_eq!(before.entries, after.entries);
    assert_eq!(rewritten.descriptor().sl_pct, 0.02);
    assert_eq!(rewritten.descriptor().leverage, 3);
    assert_eq!(rewritten.descriptor().exit_after_bars, 15);
}

#[test]
fn calculate_indicators_is_deterministic_across_calls() {
    let loader = NativeLoader::new();
    let bars = synthetic_bars();
    let strategy = loader.load("sample", CODE.as_bytes()).unwrap();

    let first = strategy.calculate_indicators(&bars).unwrap();
    let second = strategy.calculate_indicators(&bars).unwrap();

    assert_eq!(first.entries, second.entries);
    assert_eq!(first.column("fast"), second.column("fast"));
}

#[test]
fn malformed_strategy_code_is_rejected_at_load() {
    let loader = NativeLoader::new();
    let broken = CODE.replace("cross_above(fast, slow)", "cross_above(fast)");
    assert!(loader.load("broken", broken.as_bytes()).is_err());
}
