//! `StrategyTemplate` CRUD (expansion, grounded on
//! `original_source/alembic/versions/005_add_strategy_templates.py`). Exists
//! purely so `strategies.template_id` resolves to a real row.

use anyhow::{Context, Result};
use flow_schemas::{StrategyKind, StrategyTemplate};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub async fn insert(pool: &PgPool, t: &StrategyTemplate) -> Result<()> {
    sqlx::query(
        "insert into strategy_templates (id, name, family, created_at) values ($1, $2, $3, $4)",
    )
    .bind(t.id)
    .bind(&t.name)
    .bind(t.family.as_str())
    .bind(t.created_at)
    .execute(pool)
    .await
    .context("insert strategy_template failed")?;
    Ok(())
}

pub async fn fetch(pool: &PgPool, id: Uuid) -> Result<StrategyTemplate> {
    let row = sqlx::query("select id, name, family, created_at from strategy_templates where id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("fetch strategy_template failed")?;

    let family_str: String = row.try_get("family")?;
    Ok(StrategyTemplate {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        family: StrategyKind::parse(&family_str)
            .with_context(|| format!("unknown family in DB: {family_str}"))?,
        created_at: row.try_get("created_at")?,
    })
}
