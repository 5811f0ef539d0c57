//! Exclusion list database operations.

use sqlx::PgPool;

use crate::models::{ExclusionListEntry, ExclusionSource};

pub async fn is_excluded(pool: &PgPool, phone: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM exclusion_list_entries WHERE phone = $1")
        .bind(phone)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn add(
    pool: &PgPool,
    phone: &str,
    reason: Option<&str>,
    source: ExclusionSource,
) -> Result<ExclusionListEntry, sqlx::Error> {
    sqlx::query_as::<_, ExclusionListEntry>(
        r#"
        INSERT INTO exclusion_list_entries (phone, reason, source)
        VALUES ($1, $2, $3)
        ON CONFLICT (phone) DO UPDATE SET reason = EXCLUDED.reason
        RETURNING id, phone, reason, source, created_at
        "#,
    )
    .bind(phone)
    .bind(reason)
    .bind(source)
    .fetch_one(pool)
    .await
}
