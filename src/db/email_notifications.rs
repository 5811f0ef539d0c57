//! Email notification database operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EmailNotification, EmailNotificationStatus};

const COLUMNS: &str = r#"
    id, event_id, contact_id, campaign_id, template_id, to_email, status,
    retry_count, provider_message_id, error_message, created_at, updated_at
"#;

pub async fn get_by_event_id(
    pool: &PgPool,
    event_id: Uuid,
) -> Result<Option<EmailNotification>, sqlx::Error> {
    sqlx::query_as::<_, EmailNotification>(&format!(
        "SELECT {COLUMNS} FROM email_notifications WHERE event_id = $1"
    ))
    .bind(event_id)
    .fetch_optional(pool)
    .await
}

/// Creates the row `pending` if it doesn't already exist; returns the
/// existing row otherwise (email worker step 4: idempotent by `event_id`).
pub async fn get_or_create_pending(
    pool: &PgPool,
    event_id: Uuid,
    contact_id: i64,
    campaign_id: i64,
    template_id: &str,
    to_email: &str,
) -> Result<EmailNotification, sqlx::Error> {
    sqlx::query_as::<_, EmailNotification>(&format!(
        r#"
        INSERT INTO email_notifications (event_id, contact_id, campaign_id, template_id, to_email)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (event_id) DO UPDATE SET event_id = EXCLUDED.event_id
        RETURNING {COLUMNS}
        "#
    ))
    .bind(event_id)
    .bind(contact_id)
    .bind(campaign_id)
    .bind(template_id)
    .bind(to_email)
    .fetch_one(pool)
    .await
}

pub async fn mark_sent(
    pool: &PgPool,
    id: i64,
    provider_message_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE email_notifications
        SET status = 'sent', provider_message_id = $2, error_message = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(provider_message_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_failure(
    pool: &PgPool,
    id: i64,
    error_message: &str,
    max_retries: i32,
) -> Result<EmailNotificationStatus, sqlx::Error> {
    let row: (i32,) = sqlx::query_as(
        r#"
        UPDATE email_notifications
        SET retry_count = retry_count + 1, error_message = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING retry_count
        "#,
    )
    .bind(id)
    .bind(error_message)
    .fetch_one(pool)
    .await?;

    if row.0 >= max_retries {
        sqlx::query("UPDATE email_notifications SET status = 'failed', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(EmailNotificationStatus::Failed)
    } else {
        Ok(EmailNotificationStatus::Pending)
    }
}
