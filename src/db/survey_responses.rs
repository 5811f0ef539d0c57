//! Survey response database operations.

use sqlx::{Postgres, Transaction};

use crate::models::SurveyResponse;

/// I4/I5: exactly-once per `(contact_id, campaign_id, call_attempt_id)` via
/// the unique constraint; `ON CONFLICT DO NOTHING` makes webhook replay
/// idempotent (P5) instead of erroring.
#[allow(clippy::too_many_arguments)]
pub async fn insert_if_absent(
    tx: &mut Transaction<'_, Postgres>,
    contact_id: i64,
    campaign_id: i64,
    call_attempt_id: i64,
    answers: &[(String, Option<f32>); 3],
) -> Result<Option<SurveyResponse>, sqlx::Error> {
    sqlx::query_as::<_, SurveyResponse>(
        r#"
        INSERT INTO survey_responses
            (contact_id, campaign_id, call_attempt_id,
             q1_answer, q1_confidence, q2_answer, q2_confidence, q3_answer, q3_confidence)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (contact_id, campaign_id, call_attempt_id) DO NOTHING
        RETURNING id, contact_id, campaign_id, call_attempt_id,
                  q1_answer, q1_confidence, q2_answer, q2_confidence,
                  q3_answer, q3_confidence, completed_at
        "#,
    )
    .bind(contact_id)
    .bind(campaign_id)
    .bind(call_attempt_id)
    .bind(&answers[0].0)
    .bind(answers[0].1)
    .bind(&answers[1].0)
    .bind(answers[1].1)
    .bind(&answers[2].0)
    .bind(answers[2].1)
    .fetch_optional(&mut **tx)
    .await
}
