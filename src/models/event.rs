use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub event_id: Uuid,
    pub event_type: SurveyEventType,
    pub campaign_id: i64,
    pub contact_id: i64,
    pub call_attempt_id: Option<i64>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "survey_event_type")]
pub enum SurveyEventType {
    #[sqlx(rename = "survey.completed")]
    #[serde(rename = "survey.completed")]
    Completed,
    #[sqlx(rename = "survey.refused")]
    #[serde(rename = "survey.refused")]
    Refused,
    #[sqlx(rename = "survey.not_reached")]
    #[serde(rename = "survey.not_reached")]
    NotReached,
}

impl SurveyEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            SurveyEventType::Completed => "survey.completed",
            SurveyEventType::Refused => "survey.refused",
            SurveyEventType::NotReached => "survey.not_reached",
        }
    }
}
