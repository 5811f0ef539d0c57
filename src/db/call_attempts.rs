//! Call attempt database operations.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{CallAttempt, CallOutcome};

const COLUMNS: &str = r#"
    id, contact_id, campaign_id, attempt_number, call_id, provider_call_id,
    started_at, answered_at, ended_at, outcome, error_code, metadata
"#;

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    contact_id: i64,
    campaign_id: i64,
    attempt_number: i32,
    call_id: Uuid,
) -> Result<CallAttempt, sqlx::Error> {
    sqlx::query_as::<_, CallAttempt>(&format!(
        r#"
        INSERT INTO call_attempts (contact_id, campaign_id, attempt_number, call_id, started_at, metadata)
        VALUES ($1, $2, $3, $4, NOW(), '{{}}'::jsonb)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(contact_id)
    .bind(campaign_id)
    .bind(attempt_number)
    .bind(call_id)
    .fetch_one(&mut **tx)
    .await
}

/// Process-wide in-flight count used by the scheduler's capacity check
/// (spec.md §4.1 step 2): every `CallAttempt` without a terminal outcome,
/// across all campaigns.
pub async fn count_in_flight(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM call_attempts WHERE outcome IS NULL")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn get_by_call_id(pool: &PgPool, call_id: Uuid) -> Result<Option<CallAttempt>, sqlx::Error> {
    sqlx::query_as::<_, CallAttempt>(&format!(
        "SELECT {COLUMNS} FROM call_attempts WHERE call_id = $1"
    ))
    .bind(call_id)
    .fetch_optional(pool)
    .await
}

/// Locks the row for the duration of the caller's transaction so that
/// concurrent webhook deliveries for the same `call_id` serialize (§5
/// "webhook events for the same call_id are serialized by row lock").
pub async fn get_by_call_id_for_update(
    tx: &mut Transaction<'_, Postgres>,
    call_id: Uuid,
) -> Result<Option<CallAttempt>, sqlx::Error> {
    sqlx::query_as::<_, CallAttempt>(&format!(
        "SELECT {COLUMNS} FROM call_attempts WHERE call_id = $1 FOR UPDATE"
    ))
    .bind(call_id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn set_provider_call_id(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
    provider_call_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE call_attempts SET provider_call_id = $2 WHERE id = $1")
        .bind(id)
        .bind(provider_call_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn set_answered(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
    answered_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE call_attempts SET answered_at = $2 WHERE id = $1 AND answered_at IS NULL")
        .bind(id)
        .bind(answered_at)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn set_terminal(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
    ended_at: DateTime<Utc>,
    outcome: CallOutcome,
    error_code: Option<&str>,
    raw_status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE call_attempts
        SET ended_at = $2, outcome = $3, error_code = $4,
            metadata = metadata || jsonb_build_object('raw_status', $5::text)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(ended_at)
    .bind(outcome)
    .bind(error_code)
    .bind(raw_status)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn merge_metadata(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
    patch: &Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE call_attempts SET metadata = metadata || $2 WHERE id = $1")
        .bind(id)
        .bind(patch)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
