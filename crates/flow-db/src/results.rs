//! CRUD over `backtest_results` (spec §3 BacktestResult). Owned by the
//! Backtester Orchestrator; the Evaluator reads training/holdout pairs.

use anyhow::{Context, Result};
use flow_schemas::{BacktestResult, PeriodType, Timeframe};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_result(row: sqlx::postgres::PgRow) -> Result<BacktestResult> {
    let period_type_str: String = row.try_get("period_type")?;
    let timeframe_str: String = row.try_get("timeframe_tested")?;
    let symbols_tested: serde_json::Value = row.try_get("symbols_tested")?;
    let per_symbol_results: serde_json::Value = row.try_get("per_symbol_results")?;

    Ok(BacktestResult {
        id: row.try_get("id")?,
        strategy_id: row.try_get("strategy_id")?,
        period_type: PeriodType::parse(&period_type_str)
            .with_context(|| format!("unknown period_type in DB: {period_type_str}"))?,
        period_days: row.try_get::<i32, _>("period_days")? as i64,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        total_trades: row.try_get::<i32, _>("total_trades")? as i64,
        win_rate: row.try_get("win_rate")?,
        sharpe_ratio: row.try_get("sharpe_ratio")?,
        expectancy: row.try_get("expectancy")?,
        max_drawdown: row.try_get("max_drawdown")?,
        total_return_pct: row.try_get("total_return_pct")?,
        final_equity: row.try_get("final_equity")?,
        symbols_tested: serde_json::from_value(symbols_tested).context("symbols_tested decode")?,
        timeframe_tested: Timeframe::parse(&timeframe_str)
            .with_context(|| format!("unknown timeframe_tested in DB: {timeframe_str}"))?,
        is_optimal_tf: row.try_get("is_optimal_tf")?,
        per_symbol_results: serde_json::from_value(per_symbol_results)
            .context("per_symbol_results decode")?,
        recent_result_id: row.try_get("recent_result_id")?,
        weighted_sharpe: row.try_get("weighted_sharpe")?,
        weighted_sharpe_pure: row.try_get("weighted_sharpe_pure")?,
        weighted_expectancy: row.try_get("weighted_expectancy")?,
        weighted_win_rate: row.try_get("weighted_win_rate")?,
        weighted_walk_forward_stability: row.try_get("weighted_walk_forward_stability")?,
        weighted_max_drawdown: row.try_get("weighted_max_drawdown")?,
        recency_ratio: row.try_get("recency_ratio")?,
        recency_penalty: row.try_get("recency_penalty")?,
        walk_forward_stability: row.try_get("walk_forward_stability")?,
    })
}

const SELECT_COLUMNS: &str = r#"
    id, strategy_id, period_type, period_days, start_date, end_date, total_trades, win_rate,
    sharpe_ratio, expectancy, max_drawdown, total_return_pct, final_equity, symbols_tested,
    timeframe_tested, is_optimal_tf, per_symbol_results, recent_result_id, weighted_sharpe,
    weighted_sharpe_pure, weighted_expectancy, weighted_win_rate, weighted_walk_forward_stability,
    weighted_max_drawdown, recency_ratio, recency_penalty, walk_forward_stability
"#;

pub async fn insert(pool: &PgPool, r: &BacktestResult) -> Result<()> {
    sqlx::query(
        r#"
        insert into backtest_results (
            id, strategy_id, period_type, period_days, start_date, end_date, total_trades,
            win_rate, sharpe_ratio, expectancy, max_drawdown, total_return_pct, final_equity,
            symbols_tested, timeframe_tested, is_optimal_tf, per_symbol_results, recent_result_id,
            weighted_sharpe, weighted_sharpe_pure, weighted_expectancy, weighted_win_rate,
            weighted_walk_forward_stability, weighted_max_drawdown, recency_ratio,
            recency_penalty, walk_forward_stability
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
            $19, $20, $21, $22, $23, $24, $25, $26, $27
        )
        "#,
    )
    .bind(r.id)
    .bind(r.strategy_id)
    .bind(r.period_type.as_str())
    .bind(r.period_days as i32)
    .bind(r.start_date)
    .bind(r.end_date)
    .bind(r.total_trades as i32)
    .bind(r.win_rate)
    .bind(r.sharpe_ratio)
    .bind(r.expectancy)
    .bind(r.max_drawdown)
    .bind(r.total_return_pct)
    .bind(r.final_equity)
    .bind(serde_json::to_value(&r.symbols_tested)?)
    .bind(r.timeframe_tested.as_str())
    .bind(r.is_optimal_tf)
    .bind(serde_json::to_value(&r.per_symbol_results)?)
    .bind(r.recent_result_id)
    .bind(r.weighted_sharpe)
    .bind(r.weighted_sharpe_pure)
    .bind(r.weighted_expectancy)
    .bind(r.weighted_win_rate)
    .bind(r.weighted_walk_forward_stability)
    .bind(r.weighted_max_drawdown)
    .bind(r.recency_ratio)
    .bind(r.recency_penalty)
    .bind(r.walk_forward_stability)
    .execute(pool)
    .await
    .context("insert backtest_result failed")?;

    Ok(())
}

/// Most recent training/holdout pair for a strategy's optimal timeframe,
/// newest first. The Evaluator reads the head of this list.
pub async fn list_for_strategy(pool: &PgPool, strategy_id: Uuid) -> Result<Vec<BacktestResult>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from backtest_results where strategy_id = $1 order by id desc"
    ))
    .bind(strategy_id)
    .fetch_all(pool)
    .await
    .context("list_for_strategy failed")?;

    rows.into_iter().map(row_to_result).collect()
}

pub async fn fetch(pool: &PgPool, id: Uuid) -> Result<BacktestResult> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from backtest_results where id = $1"
    ))
    .bind(id)
    .fetch_one(pool)
    .await
    .context("fetch backtest_result failed")?;
    row_to_result(row)
}
