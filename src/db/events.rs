//! Event (survey lifecycle event) database operations.

use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Event, SurveyEventType};

/// P6: exactly-once per `(event_type, contact_id, call_attempt_id)`. A
/// webhook replay that re-enters the terminal branch hits the unique
/// constraint and returns `None` instead of a duplicate row.
pub async fn insert_if_absent(
    tx: &mut Transaction<'_, Postgres>,
    event_type: SurveyEventType,
    campaign_id: i64,
    contact_id: i64,
    call_attempt_id: Option<i64>,
    payload: &Value,
) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(
        r#"
        INSERT INTO events (event_id, event_type, campaign_id, contact_id, call_attempt_id, payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (event_type, contact_id, call_attempt_id) DO NOTHING
        RETURNING id, event_id, event_type, campaign_id, contact_id, call_attempt_id, payload, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(event_type)
    .bind(campaign_id)
    .bind(contact_id)
    .bind(call_attempt_id)
    .bind(payload)
    .fetch_optional(&mut **tx)
    .await
}
