use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct SurveyResponse {
    pub id: i64,
    pub contact_id: i64,
    pub campaign_id: i64,
    pub call_attempt_id: i64,
    pub q1_answer: String,
    pub q1_confidence: Option<f32>,
    pub q2_answer: String,
    pub q2_confidence: Option<f32>,
    pub q3_answer: String,
    pub q3_confidence: Option<f32>,
    pub completed_at: DateTime<Utc>,
}
