use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub status: CampaignStatus,
    pub language: Language,
    pub intro_script: String,
    pub question_1_text: String,
    pub question_1_type: QuestionAnswerType,
    pub question_2_text: String,
    pub question_2_type: QuestionAnswerType,
    pub question_3_text: String,
    pub question_3_type: QuestionAnswerType,
    pub max_attempts: i32,
    pub retry_interval_minutes: i32,
    pub call_window_start: NaiveTime,
    pub call_window_end: NaiveTime,
    pub timezone: String,
    pub retry_template_id: Option<String>,
    pub email_template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn question_text(&self, position: u8) -> Option<&str> {
        match position {
            1 => Some(&self.question_1_text),
            2 => Some(&self.question_2_text),
            3 => Some(&self.question_3_text),
            _ => None,
        }
    }

    pub fn question_type(&self, position: u8) -> Option<QuestionAnswerType> {
        match position {
            1 => Some(self.question_1_type),
            2 => Some(self.question_2_type),
            3 => Some(self.question_3_type),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    /// Validated status transitions: draft->scheduled->running->{paused<->running}->{completed,cancelled}.
    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Scheduled, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Paused, Cancelled)
                | (Scheduled, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "question_answer_type", rename_all = "snake_case")]
pub enum QuestionAnswerType {
    FreeText,
    Numeric,
    Scale,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "contact_language", rename_all = "snake_case")]
pub enum Language {
    En,
    It,
    Auto,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::It => "it",
            Language::Auto => "auto",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_can_pause_and_resume() {
        assert!(CampaignStatus::Running.can_transition_to(CampaignStatus::Paused));
        assert!(CampaignStatus::Paused.can_transition_to(CampaignStatus::Running));
    }

    #[test]
    fn completed_is_terminal() {
        assert!(!CampaignStatus::Completed.can_transition_to(CampaignStatus::Running));
    }
}
