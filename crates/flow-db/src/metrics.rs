//! `PipelineMetricsSnapshot` CRUD (spec §3): append-only observability rows
//! written periodically by the Scheduler.

use anyhow::{Context, Result};
use flow_schemas::PipelineMetricsSnapshot;
use sqlx::{PgPool, Row};

pub async fn insert(pool: &PgPool, snapshot: &PipelineMetricsSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        insert into pipeline_metrics_snapshots (id, taken_at, queue_depths, pool_utilization)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(snapshot.id)
    .bind(snapshot.captured_at)
    .bind(serde_json::to_value(&snapshot.queue_depths)?)
    .bind(snapshot.pool_utilization)
    .execute(pool)
    .await
    .context("insert pipeline_metrics_snapshot failed")?;
    Ok(())
}

/// Most recent snapshots, newest first.
pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<PipelineMetricsSnapshot>> {
    let rows = sqlx::query(
        r#"
        select id, taken_at, queue_depths, pool_utilization
        from pipeline_metrics_snapshots
        order by taken_at desc
        limit $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_recent metrics snapshots failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let queue_depths_json: serde_json::Value = row.try_get("queue_depths")?;
        out.push(PipelineMetricsSnapshot {
            id: row.try_get("id")?,
            captured_at: row.try_get("taken_at")?,
            queue_depths: serde_json::from_value(queue_depths_json)
                .context("queue_depths decode")?,
            pool_utilization: row.try_get("pool_utilization")?,
        });
    }
    Ok(out)
}
