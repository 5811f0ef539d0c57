use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct EmailNotification {
    pub id: i64,
    pub event_id: Uuid,
    pub contact_id: i64,
    pub campaign_id: i64,
    pub template_id: String,
    pub to_email: String,
    pub status: EmailNotificationStatus,
    pub retry_count: i32,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "email_notification_status", rename_all = "snake_case")]
pub enum EmailNotificationStatus {
    Pending,
    Sent,
    Failed,
}
