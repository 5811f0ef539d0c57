use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::campaign::Language;
use super::call_attempt::CallOutcome;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Contact {
    pub id: i64,
    pub campaign_id: i64,
    pub phone: String,
    pub email: Option<String>,
    pub preferred_language: Language,
    pub has_prior_consent: bool,
    pub do_not_call: bool,
    pub state: ContactState,
    pub attempts_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CallOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "contact_state", rename_all = "snake_case")]
pub enum ContactState {
    Pending,
    InProgress,
    Completed,
    Refused,
    NotReached,
    Excluded,
}

impl ContactState {
    /// I3: contacts in one of these states are never scheduled again.
    pub fn is_terminal_for_scheduling(self) -> bool {
        matches!(
            self,
            ContactState::Completed | ContactState::Refused | ContactState::Excluded
        )
    }
}
