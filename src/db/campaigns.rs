//! Campaign database operations.

use sqlx::PgPool;

use crate::models::Campaign;

const COLUMNS: &str = r#"
    id, name, status, language, intro_script,
    question_1_text, question_1_type, question_2_text, question_2_type,
    question_3_text, question_3_type, max_attempts, retry_interval_minutes,
    call_window_start, call_window_end, timezone, retry_template_id,
    email_template_id, created_at, updated_at
"#;

pub async fn get_by_id(pool: &PgPool, id: i64) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(&format!(
        "SELECT {COLUMNS} FROM campaigns WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_running(pool: &PgPool) -> Result<Vec<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(&format!(
        "SELECT {COLUMNS} FROM campaigns WHERE status = 'running'"
    ))
    .fetch_all(pool)
    .await
}

pub async fn update_status(
    pool: &PgPool,
    id: i64,
    status: crate::models::CampaignStatus,
) -> Result<Campaign, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(&format!(
        "UPDATE campaigns SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .fetch_one(pool)
    .await
}
