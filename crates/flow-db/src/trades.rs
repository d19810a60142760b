//! CRUD over `trades` (spec §3 Trade). Owned by the Executor; the Scorer
//! reads against it but never writes.

use anyhow::{Context, Result};
use flow_schemas::{Trade, TradeSide};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_trade(row: sqlx::postgres::PgRow) -> Result<Trade> {
    let side_str: String = row.try_get("side")?;
    Ok(Trade {
        id: row.try_get("id")?,
        strategy_id: row.try_get("strategy_id")?,
        symbol: row.try_get("symbol")?,
        side: match side_str.as_str() {
            "long" => TradeSide::Long,
            "short" => TradeSide::Short,
            other => anyhow::bail!("unknown trade side in DB: {other}"),
        },
        entry_time: row.try_get("entry_time")?,
        exit_time: row.try_get("exit_time")?,
        pnl_usd: row.try_get("pnl_usd")?,
        pnl_pct: row.try_get("pnl_pct")?,
    })
}

pub async fn insert(pool: &PgPool, t: &Trade) -> Result<()> {
    sqlx::query(
        r#"
        insert into trades (id, strategy_id, symbol, side, entry_time, exit_time, pnl_usd, pnl_pct)
        values ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(t.id)
    .bind(t.strategy_id)
    .bind(&t.symbol)
    .bind(t.side.as_str())
    .bind(t.entry_time)
    .bind(t.exit_time)
    .bind(t.pnl_usd)
    .bind(t.pnl_pct)
    .execute(pool)
    .await
    .context("insert trade failed")?;
    Ok(())
}

/// All closed trades for a strategy, most recent exit first — the Scorer's
/// input for live rollups.
pub async fn list_for_strategy(pool: &PgPool, strategy_id: Uuid) -> Result<Vec<Trade>> {
    let rows = sqlx::query(
        r#"
        select id, strategy_id, symbol, side, entry_time, exit_time, pnl_usd, pnl_pct
        from trades
        where strategy_id = $1
        order by exit_time desc
        "#,
    )
    .bind(strategy_id)
    .fetch_all(pool)
    .await
    .context("list_for_strategy (trades) failed")?;

    rows.into_iter().map(row_to_trade).collect()
}
