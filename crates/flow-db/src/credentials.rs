//! `Credential` read path (spec §3, §6). The core only ever selects a row
//! by `subaccount_id` and passes the opaque bytes into the execution
//! adapter's constructor — it never inspects the signing material.

use anyhow::{Context, Result};
use chrono::Utc;
use flow_schemas::Credential;
use sqlx::{PgPool, Row};

fn row_to_credential(row: sqlx::postgres::PgRow) -> Result<Credential> {
    Ok(Credential {
        id: row.try_get("id")?,
        subaccount_id: row.try_get("subaccount_id")?,
        signing_material: row.try_get("signing_material")?,
        is_active: row.try_get("is_active")?,
        expires_at: row.try_get("expires_at")?,
    })
}

/// The active, unexpired credential for a subaccount, if any.
pub async fn find_active(pool: &PgPool, subaccount_id: i64) -> Result<Option<Credential>> {
    let row = sqlx::query(
        r#"
        select id, subaccount_id, signing_material, is_active, expires_at
        from credentials
        where subaccount_id = $1
          and is_active
          and (expires_at is null or expires_at > now())
        order by created_at desc
        limit 1
        "#,
    )
    .bind(subaccount_id)
    .fetch_optional(pool)
    .await
    .context("find_active credential failed")?;

    let Some(row) = row else { return Ok(None) };
    let cred = row_to_credential(row)?;
    debug_assert!(cred.is_usable(Utc::now()));
    Ok(Some(cred))
}

/// All credentials in table order (insertion order), usable for FIFO
/// subaccount selection (`flow_execution::subaccount::select_subaccount`).
pub async fn list_all(pool: &PgPool) -> Result<Vec<Credential>> {
    let rows = sqlx::query(
        r#"
        select id, subaccount_id, signing_material, is_active, expires_at
        from credentials
        order by created_at asc
        "#,
    )
    .fetch_all(pool)
    .await
    .context("list_all credentials failed")?;

    rows.into_iter().map(row_to_credential).collect()
}
