//! First-touch SL/TP exit simulation shared by the single-tuple engine
//! (§4.3) and the parametric kernel (§4.4).

use flow_cache::OhlcvBar;
use flow_strategy::Direction;

/// The outcome of simulating one entry against SL/TP/time-exit rules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExitOutcome {
    pub exit_index: usize,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Direction-adjusted fractional price return: positive is a win.
    pub pct_return: f64,
}

/// Simulate a single entry at `bars[entry_index]`'s close, scanning forward
/// for the first touch of SL or TP (SL wins on ambiguous bars), or a
/// time-exit at close after `exit_after_bars` bars. `tp_pct == 0.0` disables
/// the take-profit leg; `exit_after_bars == 0` disables the time-exit leg
/// (at least one must be active — the admission filter enforces this
/// upstream). If neither triggers before the data runs out, the position is
/// force-closed at the last available bar's close.
pub fn simulate_first_touch_exit(
    bars: &[OhlcvBar],
    entry_index: usize,
    direction: Direction,
    sl_pct: f64,
    tp_pct: f64,
    exit_after_bars: u32,
) -> Option<ExitOutcome> {
    if entry_index >= bars.len() {
        return None;
    }
    let entry_price = bars[entry_index].close;
    if entry_price <= 0.0 {
        return None;
    }

    let (sl_price, tp_price) = match direction {
        Direction::Long => (
            entry_price * (1.0 - sl_pct),
            if tp_pct > 0.0 {
                Some(entry_price * (1.0 + tp_pct))
            } else {
                None
            },
        ),
        Direction::Short => (
            entry_price * (1.0 + sl_pct),
            if tp_pct > 0.0 {
                Some(entry_price * (1.0 - tp_pct))
            } else {
                None
            },
        ),
    };

    let last_index = bars.len() - 1;
    let time_exit_index = if exit_after_bars > 0 {
        Some((entry_index + exit_after_bars as usize).min(last_index))
    } else {
        None
    };

    for i in (entry_index + 1)..bars.len() {
        let bar = &bars[i];

        let sl_touched = match direction {
            Direction::Long => bar.low <= sl_price,
            Direction::Short => bar.high >= sl_price,
        };
        if sl_touched {
            return Some(finish(entry_price, sl_price, i, direction));
        }

        if let Some(tp) = tp_price {
            let tp_touched = match direction {
                Direction::Long => bar.high >= tp,
                Direction::Short => bar.low <= tp,
            };
            if tp_touched {
                return Some(finish(entry_price, tp, i, direction));
            }
        }

        if let Some(exit_at) = time_exit_index {
            if i >= exit_at {
                return Some(finish(entry_price, bar.close, i, direction));
            }
        }
    }

    Some(finish(entry_price, bars[last_index].close, last_index, direction))
}

fn finish(entry_price: f64, exit_price: f64, exit_index: usize, direction: Direction) -> ExitOutcome {
    let raw = (exit_price - entry_price) / entry_price;
    let pct_return = match direction {
        Direction::Long => raw,
        Direction::Short => -raw,
    };
    ExitOutcome {
        exit_index,
        entry_price,
        exit_price,
        pct_return,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(i: i64, o: f64, h: f64, l: f64, c: f64) -> OhlcvBar {
        OhlcvBar {
            timestamp: Utc.timestamp_opt(i * 3600, 0).unwrap(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        }
    }

    #[test]
    fn long_stop_loss_wins_on_ambiguous_bar() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0, 100.0),
            bar(1, 100.0, 112.0, 90.0, 100.0), // both SL (95) and TP (110) touched
        ];
        let out = simulate_first_touch_exit(&bars, 0, Direction::Long, 0.05, 0.10, 0).unwrap();
        assert_eq!(out.exit_index, 1);
        assert!((out.exit_price - 95.0).abs() < 1e-9);
        assert!(out.pct_return < 0.0);
    }

    #[test]
    fn long_take_profit_hit_cleanly() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0, 100.0),
            bar(1, 101.0, 111.0, 99.0, 105.0),
        ];
        let out = simulate_first_touch_exit(&bars, 0, Direction::Long, 0.05, 0.10, 0).unwrap();
        assert!((out.exit_price - 110.0).abs() < 1e-9);
        assert!(out.pct_return > 0.0);
    }

    #[test]
    fn time_exit_at_close_when_no_touch() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0, 100.0),
            bar(1, 100.0, 103.0, 98.0, 102.0),
            bar(2, 102.0, 104.0, 99.0, 103.0),
        ];
        let out = simulate_first_touch_exit(&bars, 0, Direction::Long, 0.05, 0.10, 2).unwrap();
        assert_eq!(out.exit_index, 2);
        assert!((out.exit_price - 103.0).abs() < 1e-9);
    }

    #[test]
    fn force_closed_at_last_bar_when_data_runs_out() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0, 100.0),
            bar(1, 100.0, 101.0, 99.0, 100.5),
        ];
        let out = simulate_first_touch_exit(&bars, 0, Direction::Long, 0.05, 0.0, 0).unwrap();
        assert_eq!(out.exit_index, 1);
        assert!((out.exit_price - 100.5).abs() < 1e-9);
    }

    #[test]
    fn short_direction_inverts_pct_return_sign() {
        let bars = vec![
            bar(0, 100.0, 100.0, 100.0, 100.0),
            bar(1, 99.0, 99.0, 90.0, 91.0),
        ];
        let out = simulate_first_touch_exit(&bars, 0, Direction::Short, 0.05, 0.10, 0).unwrap();
        // TP for short at 90; touched since low=90
        assert!((out.exit_price - 90.0).abs() < 1e-9);
        assert!(out.pct_return > 0.0);
    }
}
