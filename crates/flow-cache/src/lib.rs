//! Read-only OHLCV cache reader (spec §4.2).
//!
//! Reads ONLY from parquet cache files, one per `(symbol, timeframe)`, named
//! `{symbol}_{timeframe}.parquet` under the configured cache root. The core
//! **never** downloads: a missing file is `CacheError::NotFound`, and the
//! caller (the Orchestrator) is expected to skip that symbol/strategy and
//! move on, not abort the process.
//!
//! Grounded on `original_source/src/backtester/cache_reader.py`, rewritten
//! onto `polars`'s columnar parquet reader instead of pandas.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use flow_schemas::Timeframe;
use polars::prelude::*;

/// One OHLCV candle. `timestamp` is the bar's close time, UTC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhlcvBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug)]
pub enum CacheError {
    /// The cache root directory itself does not exist.
    RootMissing { dir: PathBuf },
    /// No file for this (symbol, timeframe) pair.
    NotFound { symbol: String, timeframe: Timeframe },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::RootMissing { dir } => {
                write!(f, "cache root does not exist: {}", dir.display())
            }
            CacheError::NotFound { symbol, timeframe } => {
                write!(f, "no cache file for {symbol} {}", timeframe.as_str())
            }
        }
    }
}

impl std::error::Error for CacheError {}

/// Summary metadata for a cached series (spec §4.2 `get_cache_info`).
#[derive(Debug, Clone, Copy)]
pub struct CacheInfo {
    pub candles: usize,
    pub first_ts: Option<DateTime<Utc>>,
    pub last_ts: Option<DateTime<Utc>>,
    /// Calendar days between `first_ts` and `last_ts`.
    pub covered_days: i64,
}

/// Read-only accessor over the OHLCV cache directory. Never mutates, never
/// makes network calls.
pub struct CacheReader {
    cache_dir: PathBuf,
}

impl CacheReader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            return Err(CacheError::RootMissing { dir: cache_dir }.into());
        }
        Ok(Self { cache_dir })
    }

    fn file_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.cache_dir
            .join(format!("{symbol}_{}.parquet", timeframe.as_str()))
    }

    /// Read the full cached frame for `symbol`/`timeframe`, then trim to the
    /// trailing `days` window ending at `end` (default: the data's own last
    /// timestamp). An existing-but-empty file returns an empty `Vec`, never
    /// an error.
    pub fn read(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        days: Option<i64>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<OhlcvBar>> {
        let path = self.file_path(symbol, timeframe);
        if !path.exists() {
            return Err(CacheError::NotFound {
                symbol: symbol.to_string(),
                timeframe,
            }
            .into());
        }

        let mut bars = read_bars_from_parquet(&path)
            .with_context(|| format!("reading cache file {}", path.display()))?;
        bars.sort_by_key(|b| b.timestamp);

        if let Some(end) = end {
            bars.retain(|b| b.timestamp <= end);
        }

        if let Some(days) = days {
            if let Some(last) = bars.last().map(|b| b.timestamp) {
                let start = last - chrono::Duration::days(days);
                bars.retain(|b| b.timestamp >= start);
            }
        }

        Ok(bars)
    }

    /// Split a full lookback window into an older `training` portion and a
    /// `holdout` portion covering the trailing `holdout_days` (spec §4.2,
    /// §4.5: the two never overlap by construction because holdout is
    /// simply the suffix of the same read).
    pub fn read_dual_periods(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        training_days: i64,
        holdout_days: i64,
        end: Option<DateTime<Utc>>,
    ) -> Result<(Vec<OhlcvBar>, Vec<OhlcvBar>)> {
        let full = self.read(symbol, timeframe, Some(training_days + holdout_days), end)?;
        if full.is_empty() {
            return Ok((full.clone(), full));
        }

        let last = full.last().unwrap().timestamp;
        let holdout_start = last - chrono::Duration::days(holdout_days);

        let training: Vec<OhlcvBar> = full
            .iter()
            .copied()
            .filter(|b| b.timestamp < holdout_start)
            .collect();
        let holdout: Vec<OhlcvBar> = full
            .iter()
            .copied()
            .filter(|b| b.timestamp >= holdout_start)
            .collect();

        Ok((training, holdout))
    }

    /// Same as [`Self::read_dual_periods`] but across many symbols at once,
    /// rejecting (silently skipping, logging) any whose coverage falls
    /// below `min_coverage_pct` of the full window (spec §4.2, §4.6).
    pub fn read_multi_symbol_dual_periods(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        training_days: i64,
        holdout_days: i64,
        end: Option<DateTime<Utc>>,
        min_coverage_pct: f64,
    ) -> (
        std::collections::BTreeMap<String, Vec<OhlcvBar>>,
        std::collections::BTreeMap<String, Vec<OhlcvBar>>,
    ) {
        let full_period_days = training_days + holdout_days;
        let mut training_out = std::collections::BTreeMap::new();
        let mut holdout_out = std::collections::BTreeMap::new();

        for symbol in symbols {
            let (training, holdout) =
                match self.read_dual_periods(symbol, timeframe, training_days, holdout_days, end) {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::debug!(symbol, %err, "skipping symbol: cache read failed");
                        continue;
                    }
                };

            if training.is_empty() && holdout.is_empty() {
                tracing::debug!(symbol, "skipping symbol: empty cache file");
                continue;
            }

            let all: Vec<OhlcvBar> = training.iter().chain(holdout.iter()).copied().collect();
            let covered = covered_days(&all);
            let coverage = if full_period_days > 0 {
                covered as f64 / full_period_days as f64
            } else {
                0.0
            };
            if coverage < min_coverage_pct {
                tracing::debug!(symbol, covered, full_period_days, "skipping symbol: insufficient coverage");
                continue;
            }

            training_out.insert(symbol.clone(), training);
            holdout_out.insert(symbol.clone(), holdout);
        }

        (training_out, holdout_out)
    }

    /// Every symbol with a cache file, optionally filtered to one timeframe.
    pub fn list_cached_symbols(&self, timeframe: Option<Timeframe>) -> Result<Vec<String>> {
        let mut symbols = BTreeSet::new();
        for entry in std::fs::read_dir(&self.cache_dir)
            .with_context(|| format!("listing cache dir {}", self.cache_dir.display()))?
        {
            let entry = entry?;
            let Some(stem) = entry.path().file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let Some((symbol, tf_str)) = stem.rsplit_once('_') else {
                continue;
            };
            if let Some(tf) = timeframe {
                if tf_str != tf.as_str() {
                    continue;
                }
            }
            symbols.insert(symbol.to_string());
        }
        Ok(symbols.into_iter().collect())
    }

    /// Every timeframe cached for `symbol`.
    pub fn list_cached_timeframes(&self, symbol: &str) -> Result<Vec<Timeframe>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.cache_dir)
            .with_context(|| format!("listing cache dir {}", self.cache_dir.display()))?
        {
            let entry = entry?;
            let Some(stem) = entry.path().file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let Some((sym, tf_str)) = stem.rsplit_once('_') else {
                continue;
            };
            if sym != symbol {
                continue;
            }
            if let Some(tf) = Timeframe::parse(tf_str) {
                out.push(tf);
            }
        }
        out.sort_by_key(|tf| tf.secs());
        Ok(out)
    }

    pub fn get_cache_info(&self, symbol: &str, timeframe: Timeframe) -> Result<Option<CacheInfo>> {
        let path = self.file_path(symbol, timeframe);
        if !path.exists() {
            return Ok(None);
        }
        let bars = read_bars_from_parquet(&path)?;
        if bars.is_empty() {
            return Ok(Some(CacheInfo {
                candles: 0,
                first_ts: None,
                last_ts: None,
                covered_days: 0,
            }));
        }
        let first_ts = bars.iter().map(|b| b.timestamp).min();
        let last_ts = bars.iter().map(|b| b.timestamp).max();
        Ok(Some(CacheInfo {
            candles: bars.len(),
            first_ts,
            last_ts,
            covered_days: covered_days(&bars),
        }))
    }
}

/// `covered_days = last_ts - first_ts` in whole calendar days (spec §4.2).
fn covered_days(bars: &[OhlcvBar]) -> i64 {
    let Some(first) = bars.iter().map(|b| b.timestamp).min() else {
        return 0;
    };
    let Some(last) = bars.iter().map(|b| b.timestamp).max() else {
        return 0;
    };
    (last - first).num_days()
}

/// Cache files store `timestamp` as epoch milliseconds (i64) plus four f64
/// price columns and an f64 volume column.
fn read_bars_from_parquet(path: &Path) -> Result<Vec<OhlcvBar>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let df = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("parsing parquet {}", path.display()))?;

    if df.height() == 0 {
        return Ok(Vec::new());
    }

    let ts = df.column("timestamp")?.i64()?;
    let open = df.column("open")?.f64()?;
    let high = df.column("high")?.f64()?;
    let low = df.column("low")?.f64()?;
    let close = df.column("close")?.f64()?;
    let volume = df.column("volume")?.f64()?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(ts), Some(o), Some(h), Some(l), Some(c), Some(v)) = (
            ts.get(i),
            open.get(i),
            high.get(i),
            low.get(i),
            close.get(i),
            volume.get(i),
        ) else {
            continue;
        };
        bars.push(OhlcvBar {
            timestamp: Utc.timestamp_millis_opt(ts).single().with_context(|| {
                format!("invalid timestamp {ts} in {}", path.display())
            })?,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
        });
    }
    Ok(bars)
}
