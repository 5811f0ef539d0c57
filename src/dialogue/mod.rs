//! Dialogue Orchestrator: per-call phase state machine driving
//! consent -> q1 -> q2 -> q3 -> done against the LLM Adapter. Session
//! management follows `AiCallHandler`'s `Arc<RwLock<HashMap<...>>>`
//! pattern (`server/ai_call_handler.rs`), keyed by `call_id` instead of
//! `call_control_id` and extended with the deterministic phase machine
//! from spec.md §4.3, grounded in `original_source/.../llm/models.py`
//! (`ControlSignal`, `SurveyContext`).

pub mod consent;
pub mod qa;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::llm::LlmClient;
use crate::models::{CallOutcome, Campaign, QuestionAnswerType};
use consent::{ConsentDetector, ConsentIntent};
use qa::{QAOrchestrator, QaIntent};

pub const REPROMPT_CAP: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialoguePhase {
    Consent,
    Q1,
    Q2,
    Q3,
    Done,
    Refused,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DialogueSession {
    pub call_id: Uuid,
    pub campaign_id: i64,
    pub contact_id: i64,
    pub language: String,
    pub phase: DialoguePhase,
    pub current_question: u8,
    pub collected_answers: [Option<(String, f32)>; 3],
    pub reprompt_count: u8,
    pub last_user_utterance: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl DialogueSession {
    fn new(call_id: Uuid, campaign_id: i64, contact_id: i64, language: String) -> Self {
        Self {
            call_id,
            campaign_id,
            contact_id,
            language,
            phase: DialoguePhase::Consent,
            current_question: 0,
            collected_answers: [None, None, None],
            reprompt_count: 0,
            last_user_utterance: None,
            started_at: Utc::now(),
        }
    }
}

/// What the orchestrator wants said next, and whether the call is over.
#[derive(Debug, Clone)]
pub struct DialogueTurn {
    pub speak_text: String,
    pub is_repeat: bool,
    pub terminal: Option<TerminalTurn>,
}

#[derive(Debug, Clone)]
pub struct TerminalTurn {
    pub outcome: CallOutcome,
    /// Present only when `outcome == Completed`: the three captured
    /// answers with their confidences, in question order.
    pub answers: Option<[(String, f32); 3]>,
}

#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("no active dialogue session for call_id {0}")]
    SessionNotFound(Uuid),
}

pub struct DialogueOrchestrator {
    consent_detector: ConsentDetector,
    qa_orchestrator: QAOrchestrator,
    sessions: Arc<RwLock<HashMap<Uuid, DialogueSession>>>,
}

impl DialogueOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            consent_detector: ConsentDetector::new(llm.clone()),
            qa_orchestrator: QAOrchestrator::new(llm),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Starts a session and returns the intro/consent prompt to speak.
    pub async fn start_session(
        &self,
        call_id: Uuid,
        campaign: &Campaign,
        contact_id: i64,
        contact_language: &str,
    ) -> String {
        let session = DialogueSession::new(call_id, campaign.id, contact_id, contact_language.to_string());
        self.sessions.write().await.insert(call_id, session);
        campaign.intro_script.clone()
    }

    pub async fn has_session(&self, call_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&call_id)
    }

    pub async fn end_session(&self, call_id: Uuid) {
        self.sessions.write().await.remove(&call_id);
    }

    /// Current captured-answer snapshot for a live session, by question
    /// position. Lets the webhook layer persist what's been captured so far
    /// into `CallAttempt.metadata` (spec.md §4.3 "Terminal output"), so a
    /// provider-side terminal webhook that lands before the orchestrator's
    /// own terminal turn can still recover any answers already given.
    pub async fn snapshot_answers(&self, call_id: Uuid) -> Option<[Option<(String, f32)>; 3]> {
        self.sessions.read().await.get(&call_id).map(|session| session.collected_answers.clone())
    }

    /// Advances the session one turn given the caller's utterance.
    pub async fn handle_utterance(
        &self,
        call_id: Uuid,
        campaign: &Campaign,
        utterance: &str,
    ) -> Result<DialogueTurn, DialogueError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&call_id)
            .ok_or(DialogueError::SessionNotFound(call_id))?;
        session.last_user_utterance = Some(utterance.to_string());

        let turn = match session.phase {
            DialoguePhase::Consent => self.handle_consent_turn(session, utterance).await,
            DialoguePhase::Q1 | DialoguePhase::Q2 | DialoguePhase::Q3 => {
                self.handle_question_turn(session, campaign, utterance).await
            }
            DialoguePhase::Done | DialoguePhase::Refused | DialoguePhase::Failed => DialogueTurn {
                speak_text: String::new(),
                is_repeat: false,
                terminal: Some(TerminalTurn {
                    outcome: phase_to_outcome(session.phase),
                    answers: None,
                }),
            },
        };

        Ok(turn)
    }

    async fn handle_consent_turn(&self, session: &mut DialogueSession, utterance: &str) -> DialogueTurn {
        let result = self.consent_detector.detect(utterance, &session.language).await;
        match result.intent {
            ConsentIntent::Positive => {
                session.phase = DialoguePhase::Q1;
                session.current_question = 1;
                DialogueTurn {
                    speak_text: "Great, thank you.".to_string(),
                    is_repeat: false,
                    terminal: None,
                }
            }
            ConsentIntent::Negative => {
                session.phase = DialoguePhase::Refused;
                DialogueTurn {
                    speak_text: "Understood, thank you for your time.".to_string(),
                    is_repeat: false,
                    terminal: Some(TerminalTurn { outcome: CallOutcome::Refused, answers: None }),
                }
            }
            ConsentIntent::Unclear => {
                session.reprompt_count += 1;
                if session.reprompt_count > REPROMPT_CAP {
                    session.phase = DialoguePhase::Failed;
                    DialogueTurn {
                        speak_text: "I'm sorry, I wasn't able to understand. Goodbye.".to_string(),
                        is_repeat: false,
                        terminal: Some(TerminalTurn { outcome: CallOutcome::Failed, answers: None }),
                    }
                } else {
                    DialogueTurn {
                        speak_text: "Sorry, could you repeat that? Would you like to take a short survey?".to_string(),
                        is_repeat: true,
                        terminal: None,
                    }
                }
            }
        }
    }

    async fn handle_question_turn(
        &self,
        session: &mut DialogueSession,
        campaign: &Campaign,
        utterance: &str,
    ) -> DialogueTurn {
        let position = session.current_question;
        let question_text = campaign.question_text(position).unwrap_or_default().to_string();
        let answer_type = campaign.question_type(position).unwrap_or(QuestionAnswerType::FreeText);

        let result = self
            .qa_orchestrator
            .parse_answer(&question_text, answer_type, &session.language, utterance)
            .await;

        match result.intent {
            QaIntent::Answer => {
                let answer_text = result.answer_text.unwrap_or_default();
                session.collected_answers[(position - 1) as usize] =
                    Some((answer_text, result.confidence));
                session.reprompt_count = 0;

                if position < 3 {
                    session.current_question = position + 1;
                    session.phase = match session.current_question {
                        2 => DialoguePhase::Q2,
                        3 => DialoguePhase::Q3,
                        _ => session.phase,
                    };
                    let next_text = campaign.question_text(session.current_question).unwrap_or_default();
                    DialogueTurn { speak_text: next_text.to_string(), is_repeat: false, terminal: None }
                } else {
                    session.phase = DialoguePhase::Done;
                    let answers = [
                        session.collected_answers[0].clone().unwrap_or_default(),
                        session.collected_answers[1].clone().unwrap_or_default(),
                        session.collected_answers[2].clone().unwrap_or_default(),
                    ];
                    DialogueTurn {
                        speak_text: "Thank you, that completes the survey. Have a great day.".to_string(),
                        is_repeat: false,
                        terminal: Some(TerminalTurn { outcome: CallOutcome::Completed, answers: Some(answers) }),
                    }
                }
            }
            QaIntent::RepeatRequest => {
                session.reprompt_count += 1;
                if session.reprompt_count > REPROMPT_CAP {
                    session.phase = DialoguePhase::Failed;
                    return DialogueTurn {
                        speak_text: "I'm sorry, let's stop here. Goodbye.".to_string(),
                        is_repeat: false,
                        terminal: Some(TerminalTurn { outcome: CallOutcome::Failed, answers: None }),
                    };
                }
                DialogueTurn { speak_text: question_text, is_repeat: true, terminal: None }
            }
            QaIntent::Unclear => {
                session.reprompt_count += 1;
                if session.reprompt_count > REPROMPT_CAP {
                    session.phase = DialoguePhase::Failed;
                    return DialogueTurn {
                        speak_text: "I'm sorry, I wasn't able to understand. Goodbye.".to_string(),
                        is_repeat: false,
                        terminal: Some(TerminalTurn { outcome: CallOutcome::Failed, answers: None }),
                    };
                }
                DialogueTurn { speak_text: question_text, is_repeat: true, terminal: None }
            }
        }
    }
}

fn phase_to_outcome(phase: DialoguePhase) -> CallOutcome {
    match phase {
        DialoguePhase::Done => CallOutcome::Completed,
        DialoguePhase::Refused => CallOutcome::Refused,
        _ => CallOutcome::Failed,
    }
}
