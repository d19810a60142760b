//! A small, sandboxed expression language for strategy code (spec §6, §9:
//! "duck-typed strategy objects become a narrow capability interface...
//! maps to a sandboxed expression/bytecode interpreter"). No host calls, no
//! loops, no recursion: every program is a flat list of scalar assignments
//! and indicator/signal definitions evaluated once per backtest.
//!
//! Grammar (one statement per line, `#` starts a comment):
//! ```text
//! sl_pct = 0.05
//! tp_pct = 0.08
//! leverage = 10
//! exit_after_bars = 20
//! direction = long
//! signal_column = entry_signal
//!
//! indicator fast = ema(close, 12)
//! indicator slow = ema(close, 26)
//! signal entry_signal = cross_above(fast, slow)
//! ```
//!
//! `calculate_indicators` evaluates `indicator` lines in declaration order
//! (later ones may reference earlier names), then evaluates exactly one
//! `signal` line matching `signal_column` to populate the entry mask.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use flow_cache::OhlcvBar;
use flow_schemas::ParamTuple;

use crate::types::{Direction, IndicatorFrame, StrategyDescriptor};

const SCALAR_KEYS: &[&str] = &[
    "sl_pct",
    "tp_pct",
    "leverage",
    "exit_after_bars",
    "direction",
    "signal_column",
];

#[derive(Debug, Clone)]
enum IndicatorExpr {
    Sma { source: String, period: usize },
    Ema { source: String, period: usize },
    Rsi { source: String, period: usize },
}

#[derive(Debug, Clone)]
enum SignalExpr {
    CrossAbove { a: String, b: String },
    CrossBelow { a: String, b: String },
    GreaterThan { a: String, threshold: f64 },
    LessThan { a: String, threshold: f64 },
}

/// A parsed program: the strategy descriptor plus the ordered indicator and
/// signal definitions needed to (re)compute it against bars.
#[derive(Debug, Clone)]
pub struct Program {
    descriptor: StrategyDescriptor,
    indicators: Vec<(String, IndicatorExpr)>,
    signal: (String, SignalExpr),
}

/// Parse strategy source text into a [`Program`]. Any failure here is a
/// `LoaderError` per spec §7: the strategy row is deleted, never retried.
pub fn parse(code: &str) -> Result<Program> {
    let mut scalars: BTreeMap<String, String> = BTreeMap::new();
    let mut indicators: Vec<(String, IndicatorExpr)> = Vec::new();
    let mut signals: Vec<(String, SignalExpr)> = Vec::new();

    for (lineno, raw) in code.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("indicator ") {
            let (name, expr) = parse_assignment(rest)
                .with_context(|| format!("line {}: malformed indicator statement", lineno + 1))?;
            let indicator = parse_indicator_expr(&expr)
                .with_context(|| format!("line {}: unknown indicator function", lineno + 1))?;
            indicators.push((name, indicator));
            continue;
        }

        if let Some(rest) = line.strip_prefix("signal ") {
            let (name, expr) = parse_assignment(rest)
                .with_context(|| format!("line {}: malformed signal statement", lineno + 1))?;
            let signal = parse_signal_expr(&expr)
                .with_context(|| format!("line {}: unknown signal function", lineno + 1))?;
            signals.push((name, signal));
            continue;
        }

        let (key, value) = parse_assignment(line)
            .with_context(|| format!("line {}: malformed statement", lineno + 1))?;
        if !SCALAR_KEYS.contains(&key.as_str()) {
            bail!("line {}: unknown attribute '{key}'", lineno + 1);
        }
        scalars.insert(key, value);
    }

    let descriptor = build_descriptor(&scalars)?;

    let signal = signals
        .into_iter()
        .find(|(name, _)| *name == descriptor.signal_column)
        .ok_or_else(|| {
            anyhow!(
                "signal_column '{}' has no matching `signal` definition",
                descriptor.signal_column
            )
        })?;

    if indicators.is_empty() {
        bail!("program defines no `indicator` statements");
    }

    Ok(Program {
        descriptor,
        indicators,
        signal,
    })
}

fn parse_assignment(line: &str) -> Result<(String, String)> {
    let (name, expr) = line
        .split_once('=')
        .ok_or_else(|| anyhow!("expected 'name = expr', got: {line}"))?;
    Ok((name.trim().to_string(), expr.trim().to_string()))
}

fn parse_call(expr: &str) -> Result<(String, Vec<String>)> {
    let (func, args) = expr
        .split_once('(')
        .ok_or_else(|| anyhow!("expected a function call, got: {expr}"))?;
    let args = args
        .strip_suffix(')')
        .ok_or_else(|| anyhow!("unclosed parenthesis in: {expr}"))?;
    let args: Vec<String> = args.split(',').map(|a| a.trim().to_string()).collect();
    Ok((func.trim().to_string(), args))
}

fn parse_indicator_expr(expr: &str) -> Result<IndicatorExpr> {
    let (func, args) = parse_call(expr)?;
    match func.as_str() {
        "sma" => Ok(IndicatorExpr::Sma {
            source: args.first().cloned().ok_or_else(|| anyhow!("sma requires a source"))?,
            period: parse_period(&args)?,
        }),
        "ema" => Ok(IndicatorExpr::Ema {
            source: args.first().cloned().ok_or_else(|| anyhow!("ema requires a source"))?,
            period: parse_period(&args)?,
        }),
        "rsi" => Ok(IndicatorExpr::Rsi {
            source: args.first().cloned().ok_or_else(|| anyhow!("rsi requires a source"))?,
            period: parse_period(&args)?,
        }),
        other => bail!("unknown indicator function '{other}'"),
    }
}

fn parse_period(args: &[String]) -> Result<usize> {
    args.get(1)
        .ok_or_else(|| anyhow!("missing period argument"))?
        .parse::<usize>()
        .context("period must be a positive integer")
}

fn parse_signal_expr(expr: &str) -> Result<SignalExpr> {
    let (func, args) = parse_call(expr)?;
    match func.as_str() {
        "cross_above" => Ok(SignalExpr::CrossAbove {
            a: args[0].clone(),
            b: args[1].clone(),
        }),
        "cross_below" => Ok(SignalExpr::CrossBelow {
            a: args[0].clone(),
            b: args[1].clone(),
        }),
        "gt" => Ok(SignalExpr::GreaterThan {
            a: args[0].clone(),
            threshold: args[1].parse().context("gt threshold must be numeric")?,
        }),
        "lt" => Ok(SignalExpr::LessThan {
            a: args[0].clone(),
            threshold: args[1].parse().context("lt threshold must be numeric")?,
        }),
        other => bail!("unknown signal function '{other}'"),
    }
}

fn build_descriptor(scalars: &BTreeMap<String, String>) -> Result<StrategyDescriptor> {
    let get = |key: &str| -> Result<&String> {
        scalars
            .get(key)
            .ok_or_else(|| anyhow!("missing required attribute '{key}'"))
    };

    let sl_pct: f64 = get("sl_pct")?.parse().context("sl_pct must be numeric")?;
    let tp_pct: f64 = get("tp_pct")?.parse().context("tp_pct must be numeric")?;
    let leverage: u32 = get("leverage")?.parse().context("leverage must be an integer")?;
    let exit_after_bars: u32 = get("exit_after_bars")?
        .parse()
        .context("exit_after_bars must be an integer")?;
    let direction = Direction::parse(get("direction")?)
        .ok_or_else(|| anyhow!("direction must be 'long' or 'short'"))?;
    let signal_column = get("signal_column")?.clone();

    if tp_pct == 0.0 && exit_after_bars == 0 {
        bail!("tp_pct=0 and exit_after_bars=0 leaves no exit mechanism");
    }

    Ok(StrategyDescriptor {
        sl_pct,
        tp_pct,
        leverage,
        exit_after_bars,
        direction,
        signal_column,
    })
}

impl Program {
    pub fn descriptor(&self) -> StrategyDescriptor {
        self.descriptor.clone()
    }

    /// Evaluate every indicator in order, then the one signal matching
    /// `signal_column`, over `bars`.
    pub fn evaluate(&self, bars: &[OhlcvBar]) -> Result<IndicatorFrame> {
        let len = bars.len();
        let mut frame = IndicatorFrame::new(len);
        frame
            .columns
            .insert("close".to_string(), bars.iter().map(|b| b.close).collect());
        frame
            .columns
            .insert("open".to_string(), bars.iter().map(|b| b.open).collect());
        frame
            .columns
            .insert("high".to_string(), bars.iter().map(|b| b.high).collect());
        frame
            .columns
            .insert("low".to_string(), bars.iter().map(|b| b.low).collect());
        frame
            .columns
            .insert("volume".to_string(), bars.iter().map(|b| b.volume).collect());

        for (name, expr) in &self.indicators {
            let series = eval_indicator(expr, &frame)?;
            frame.columns.insert(name.clone(), series);
        }

        let (_, signal_expr) = &self.signal;
        frame.entries = eval_signal(signal_expr, &frame)?;

        Ok(frame)
    }
}

fn source_series<'a>(frame: &'a IndicatorFrame, name: &str) -> Result<&'a [f64]> {
    frame
        .column(name)
        .ok_or_else(|| anyhow!("reference to undefined series '{name}'"))
}

fn eval_indicator(expr: &IndicatorExpr, frame: &IndicatorFrame) -> Result<Vec<f64>> {
    match expr {
        IndicatorExpr::Sma { source, period } => Ok(sma(source_series(frame, source)?, *period)),
        IndicatorExpr::Ema { source, period } => Ok(ema(source_series(frame, source)?, *period)),
        IndicatorExpr::Rsi { source, period } => Ok(rsi(source_series(frame, source)?, *period)),
    }
}

fn eval_signal(expr: &SignalExpr, frame: &IndicatorFrame) -> Result<Vec<bool>> {
    match expr {
        SignalExpr::CrossAbove { a, b } => {
            Ok(cross_above(source_series(frame, a)?, source_series(frame, b)?))
        }
        SignalExpr::CrossBelow { a, b } => {
            Ok(cross_below(source_series(frame, a)?, source_series(frame, b)?))
        }
        SignalExpr::GreaterThan { a, threshold } => {
            Ok(source_series(frame, a)?.iter().map(|v| v > threshold).collect())
        }
        SignalExpr::LessThan { a, threshold } => {
            Ok(source_series(frame, a)?.iter().map(|v| v < threshold).collect())
        }
    }
}

/// Simple moving average; warm-up bars before `period` samples are 0.0.
fn sma(source: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; source.len()];
    if period == 0 {
        return out;
    }
    let mut sum = 0.0;
    for i in 0..source.len() {
        sum += source[i];
        if i >= period {
            sum -= source[i - period];
        }
        if i + 1 >= period {
            out[i] = sum / period as f64;
        }
    }
    out
}

/// Exponential moving average, seeded with the first value.
fn ema(source: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![0.0; source.len()];
    if source.is_empty() || period == 0 {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    out[0] = source[0];
    for i in 1..source.len() {
        out[i] = alpha * source[i] + (1.0 - alpha) * out[i - 1];
    }
    out
}

/// Wilder's RSI. Warm-up bars before `period` samples of gain/loss are 50.0
/// (neutral).
fn rsi(source: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![50.0; source.len()];
    if period == 0 || source.len() <= period {
        return out;
    }
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = source[i] - source[i - 1];
        avg_gain += delta.max(0.0);
        avg_loss += (-delta).max(0.0);
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for i in (period + 1)..source.len() {
        let delta = source[i] - source[i - 1];
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;

        out[i] = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - (100.0 / (1.0 + rs))
        };
    }
    out
}

fn cross_above(a: &[f64], b: &[f64]) -> Vec<bool> {
    let len = a.len().min(b.len());
    let mut out = vec![false; len];
    for i in 1..len {
        out[i] = a[i - 1] <= b[i - 1] && a[i] > b[i];
    }
    out
}

fn cross_below(a: &[f64], b: &[f64]) -> Vec<bool> {
    let len = a.len().min(b.len());
    let mut out = vec![false; len];
    for i in 1..len {
        out[i] = a[i - 1] >= b[i - 1] && a[i] < b[i];
    }
    out
}

/// Rewrite the four class-level tunables in `code`'s text (spec §4.11),
/// leaving indicator/signal lines untouched, then re-parse to confirm the
/// result is still valid. Used by the Parametric-Multiplier Promotion to
/// write a survivor's winning tuple back into a strategy's own code.
pub fn rewrite_parameters(code: &str, params: &ParamTuple) -> Result<String> {
    let mut out_lines = Vec::with_capacity(code.lines().count());
    for raw in code.lines() {
        let trimmed = raw.split('#').next().unwrap_or("").trim();
        let replaced = if trimmed.starts_with("sl_pct") && trimmed.contains('=') {
            format!("sl_pct = {}", params.sl_pct)
        } else if trimmed.starts_with("tp_pct") && trimmed.contains('=') {
            format!("tp_pct = {}", params.tp_pct)
        } else if trimmed.starts_with("leverage") && trimmed.contains('=') {
            format!("leverage = {}", params.leverage)
        } else if trimmed.starts_with("exit_after_bars") && trimmed.contains('=') {
            format!("exit_after_bars = {}", params.exit_bars)
        } else {
            raw.to_string()
        };
        out_lines.push(replaced);
    }
    let rewritten = out_lines.join("\n");
    parse(&rewritten).context("rewritten code failed to re-parse")?;
    Ok(rewritten)
}
