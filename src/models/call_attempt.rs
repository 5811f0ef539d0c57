use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct CallAttempt {
    pub id: i64,
    pub contact_id: i64,
    pub campaign_id: i64,
    pub attempt_number: i32,
    pub call_id: Uuid,
    pub provider_call_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<CallOutcome>,
    pub error_code: Option<String>,
    pub metadata: serde_json::Value,
}

impl CallAttempt {
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "call_outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    Completed,
    Refused,
    NoAnswer,
    Busy,
    Failed,
}

/// Non-terminal progress states a `CallAttempt` passes through before a
/// `CallOutcome` is assigned. Kept distinct from `CallOutcome` because only
/// outcomes are persisted as a column; progress states are inferred from
/// `answered_at`/`ended_at` plus the last webhook event rank seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CallProgress {
    Queued,
    Initiated,
    Ringing,
    Answered,
}
