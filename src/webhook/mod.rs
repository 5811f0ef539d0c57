//! Webhook Ingestor & Call-Attempt State Machine. Translates provider
//! webhook events (and, via `handle_dialogue_turn`, Dialogue Orchestrator
//! turns) into authoritative transitions on `CallAttempt`/`Contact`,
//! idempotently and out-of-order tolerant. Status-code mapping grounded in
//! `original_source/runs/codex.kit/REQ-005/.../telephony_webhooks/router.py`
//! (202 on success and on unknown call_id, 400 on a processing error).

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::bus::{publisher, EventBus, SurveyAnswer, SurveyEventMessage};
use crate::db;
use crate::dialogue::DialogueOrchestrator;
use crate::models::{CallAttempt, CallOutcome, Contact, ContactState, SurveyEventType};
use crate::telephony::{TelephonyProvider, WebhookEvent, WebhookEventType};

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("unparseable payload: {0}")]
    UnparseablePayload(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct WebhookState {
    pub pool: PgPool,
    pub telephony: Arc<dyn TelephonyProvider>,
    pub dialogue: Arc<DialogueOrchestrator>,
    pub bus: Arc<dyn EventBus>,
}

/// Result of ingesting one webhook event, already accounting for
/// idempotent replay and unknown-`call_id` tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    AlreadyTerminal,
    UnknownCallId,
}

pub async fn axum_webhook_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> (StatusCode, &'static str) {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok());

    if !state.telephony.validate_signature(&body, signature) {
        return (StatusCode::UNAUTHORIZED, "invalid signature");
    }

    let event = match state.telephony.parse_webhook_event(&body) {
        Ok(event) => event,
        Err(_) => return (StatusCode::BAD_REQUEST, "unparseable payload"),
    };

    let result = match event.event_type {
        WebhookEventType::SpeechRecognized => handle_speech_event(&state, event).await,
        _ => ingest(&state, event).await,
    };

    match result {
        Ok(_) => (StatusCode::ACCEPTED, "accepted"),
        Err(WebhookError::UnparseablePayload(_)) => (StatusCode::BAD_REQUEST, "unparseable payload"),
        Err(WebhookError::InvalidSignature) => (StatusCode::UNAUTHORIZED, "invalid signature"),
        Err(WebhookError::Database(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "transient error"),
    }
}

/// Core state-machine entry point, independent of the HTTP transport so it
/// can be exercised directly in tests and reused by the scheduler's
/// immediate-adapter-failure path.
pub async fn ingest(state: &WebhookState, event: WebhookEvent) -> Result<IngestOutcome, WebhookError> {
    let Some(call_id) = event.call_id else {
        tracing::warn!(provider_call_id = %event.provider_call_id, "webhook with no call_id metadata");
        return Ok(IngestOutcome::UnknownCallId);
    };

    let mut tx = state.pool.begin().await?;
    let Some(attempt) = db::call_attempts::get_by_call_id_for_update(&mut tx, call_id).await? else {
        tracing::warn!(%call_id, "webhook for unknown call_id");
        return Ok(IngestOutcome::UnknownCallId);
    };

    // Monotonic transitions: once terminal, later events are ignored (202).
    if attempt.is_terminal() {
        return Ok(IngestOutcome::AlreadyTerminal);
    }

    match event.event_type {
        WebhookEventType::Initiated | WebhookEventType::Ringing => {
            tx.commit().await?;
            Ok(IngestOutcome::Applied)
        }
        WebhookEventType::Answered => {
            db::call_attempts::set_answered(&mut tx, attempt.id, event.ts).await?;
            let campaign = db::campaigns::get_by_id(&state.pool, attempt.campaign_id).await?;
            tx.commit().await?;

            // Start the dialogue session and speak the consent prompt now
            // that the call is live (spec.md §4.3 begins at `answered`).
            if let Some(campaign) = campaign {
                let intro = state
                    .dialogue
                    .start_session(call_id, &campaign, attempt.contact_id, campaign.language.code())
                    .await;
                match attempt.provider_call_id.as_deref() {
                    Some(provider_call_id) => {
                        if let Err(err) = state.telephony.speak(provider_call_id, &intro, campaign.language.code()).await
                        {
                            tracing::warn!(%call_id, error = %err, "failed to deliver consent prompt");
                        }
                    }
                    None => tracing::warn!(%call_id, "answered with no provider_call_id; cannot speak"),
                }
            } else {
                tracing::warn!(campaign_id = attempt.campaign_id, "answered call references unknown campaign");
            }

            Ok(IngestOutcome::Applied)
        }
        terminal_type => {
            let mut outcome = match terminal_type {
                WebhookEventType::Completed => CallOutcome::Completed,
                WebhookEventType::Failed => CallOutcome::Failed,
                WebhookEventType::NoAnswer => CallOutcome::NoAnswer,
                WebhookEventType::Busy => CallOutcome::Busy,
                WebhookEventType::SpeechRecognized => unreachable!("dispatched to handle_speech_event"),
                _ => unreachable!("initiated/ringing/answered handled above"),
            };

            // §4.2 step 2: recover whatever the Dialogue Orchestrator
            // captured so far from the metadata snapshot, since a provider
            // `completed` callback carries no answers of its own.
            let dialogue_answers =
                if outcome == CallOutcome::Completed { extract_dialogue_answers(&attempt.metadata) } else { None };

            // §4.2 step 3: `completed` requires >=3 captured answers. A
            // provider-reported completion without a full transcript is not
            // a true survey completion; route it like any other
            // non-completion outcome instead of fabricating blank answers.
            if outcome == CallOutcome::Completed && dialogue_answers.is_none() {
                outcome = CallOutcome::Failed;
            }

            let message = finalize_terminal_attempt(
                &mut tx,
                &attempt,
                outcome,
                event.ts,
                event.error_code.as_deref(),
                &event.raw_status,
                dialogue_answers,
            )
            .await?;
            tx.commit().await?;

            publish_after_commit(state.bus.as_ref(), message).await;
            Ok(IngestOutcome::Applied)
        }
    }
}

/// Reads the `{"dialogue_answers": [{"text", "confidence"}, ...]}` snapshot
/// `handle_dialogue_turn` persists after every turn, and returns the three
/// answers only if all three positions have a non-empty answer recorded.
fn extract_dialogue_answers(metadata: &serde_json::Value) -> Option<[(String, f32); 3]> {
    let entries = metadata.get("dialogue_answers")?.as_array()?;
    if entries.len() != 3 {
        return None;
    }
    let mut answers: [(String, f32); 3] = Default::default();
    for (i, entry) in entries.iter().enumerate() {
        let text = entry.get("text")?.as_str()?;
        if text.is_empty() {
            return None;
        }
        let confidence = entry.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
        answers[i] = (text.to_string(), confidence);
    }
    Some(answers)
}

fn snapshot_to_json(snapshot: &[Option<(String, f32)>; 3]) -> serde_json::Value {
    json!(snapshot
        .iter()
        .map(|answer| match answer {
            Some((text, confidence)) => json!({ "text": text, "confidence": confidence }),
            None => json!({ "text": "", "confidence": 0.0 }),
        })
        .collect::<Vec<_>>())
}

/// Routes a provider speech-recognition webhook (transcribed caller speech)
/// into the Dialogue Orchestrator for the call's current turn.
async fn handle_speech_event(state: &WebhookState, event: WebhookEvent) -> Result<IngestOutcome, WebhookError> {
    let Some(call_id) = event.call_id else {
        tracing::warn!(provider_call_id = %event.provider_call_id, "speech webhook with no call_id metadata");
        return Ok(IngestOutcome::UnknownCallId);
    };
    let Some(attempt) = db::call_attempts::get_by_call_id(&state.pool, call_id).await? else {
        tracing::warn!(%call_id, "speech webhook for unknown call_id");
        return Ok(IngestOutcome::UnknownCallId);
    };
    if attempt.is_terminal() {
        return Ok(IngestOutcome::AlreadyTerminal);
    }
    let Some(campaign) = db::campaigns::get_by_id(&state.pool, attempt.campaign_id).await? else {
        tracing::warn!(campaign_id = attempt.campaign_id, "speech webhook for unknown campaign");
        return Ok(IngestOutcome::UnknownCallId);
    };
    let Some(provider_call_id) = attempt.provider_call_id.as_deref() else {
        return Ok(IngestOutcome::UnknownCallId);
    };
    let utterance = event.utterance.unwrap_or_default();

    handle_dialogue_turn(state, call_id, provider_call_id, &campaign, &utterance).await?;
    Ok(IngestOutcome::Applied)
}

/// Applies spec.md §4.2 "on terminal event" to an already row-locked,
/// non-terminal `CallAttempt`: writes the outcome, resolves the owning
/// contact's next state, writes the `SurveyResponse` when answers were
/// captured, and writes the deduplicated `Event` row — all inside the
/// caller's transaction. Returns the message to publish once that
/// transaction commits (publishing before commit would let a subscriber
/// observe an event for a state change that could still roll back).
///
/// Used both by the webhook ingestor (terminal provider callbacks) and by
/// the scheduler when the Telephony Adapter fails before ever reaching the
/// provider (open question (ii): such failures still count as an attempt).
///
/// `dialogue_answers` carries the three captured answers when the terminal
/// transition originates from the Dialogue Orchestrator completing all
/// three questions; `None` for any other outcome.
pub async fn finalize_terminal_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    attempt: &CallAttempt,
    outcome: CallOutcome,
    ended_at: DateTime<Utc>,
    error_code: Option<&str>,
    raw_status: &str,
    dialogue_answers: Option<[(String, f32); 3]>,
) -> Result<Option<SurveyEventMessage>, sqlx::Error> {
    db::call_attempts::set_terminal(tx, attempt.id, ended_at, outcome, error_code, raw_status).await?;

    let contact = db::contacts::get_by_id_for_update(tx, attempt.contact_id)
        .await?
        .expect("call attempt references a contact row that must exist");

    match outcome {
        CallOutcome::Completed => {
            db::contacts::set_state_tx(tx, contact.id, ContactState::Completed, Some(outcome)).await?;

            let answers = dialogue_answers
                .expect("finalize_terminal_attempt is only called with CallOutcome::Completed when 3 answers were captured");
            let response_answers: [(String, Option<f32>); 3] = [
                (answers[0].0.clone(), Some(answers[0].1)),
                (answers[1].0.clone(), Some(answers[1].1)),
                (answers[2].0.clone(), Some(answers[2].1)),
            ];
            db::survey_responses::insert_if_absent(
                tx,
                contact.id,
                attempt.campaign_id,
                attempt.id,
                &response_answers,
            )
            .await?;

            let payload = json!({
                "call_attempt_id": attempt.id,
                "answers": answers.iter().map(|(text, confidence)| {
                    json!({"answer_text": text, "confidence": confidence})
                }).collect::<Vec<_>>(),
            });
            let event = db::events::insert_if_absent(
                tx,
                SurveyEventType::Completed,
                attempt.campaign_id,
                contact.id,
                Some(attempt.id),
                &payload,
            )
            .await?;

            Ok(event.map(|e| {
                build_event_message(e.event_id, SurveyEventType::Completed, &contact, attempt, &answers, "completed")
            }))
        }
        CallOutcome::Refused => {
            db::contacts::set_state_tx(tx, contact.id, ContactState::Refused, Some(outcome)).await?;

            let payload = json!({ "call_attempt_id": attempt.id });
            let event = db::events::insert_if_absent(
                tx,
                SurveyEventType::Refused,
                attempt.campaign_id,
                contact.id,
                Some(attempt.id),
                &payload,
            )
            .await?;

            Ok(event.map(|e| {
                build_event_message(e.event_id, SurveyEventType::Refused, &contact, attempt, &[], "refused")
            }))
        }
        CallOutcome::NoAnswer | CallOutcome::Busy | CallOutcome::Failed => {
            if contact.attempts_count < max_attempts_for(tx, attempt.campaign_id).await? {
                db::contacts::set_state_tx(tx, contact.id, ContactState::Pending, Some(outcome)).await?;
                Ok(None)
            } else {
                db::contacts::set_state_tx(tx, contact.id, ContactState::NotReached, Some(outcome)).await?;

                let payload = json!({ "call_attempt_id": attempt.id, "final_outcome": outcome });
                let event = db::events::insert_if_absent(
                    tx,
                    SurveyEventType::NotReached,
                    attempt.campaign_id,
                    contact.id,
                    Some(attempt.id),
                    &payload,
                )
                .await?;

                Ok(event.map(|e| {
                    build_event_message(e.event_id, SurveyEventType::NotReached, &contact, attempt, &[], "not_reached")
                }))
            }
        }
    }
}

async fn max_attempts_for(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    campaign_id: i64,
) -> Result<i32, sqlx::Error> {
    let row: (i32,) = sqlx::query_as("SELECT max_attempts FROM campaigns WHERE id = $1")
        .bind(campaign_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row.0)
}

fn build_event_message(
    event_id: Uuid,
    event_type: SurveyEventType,
    contact: &Contact,
    attempt: &CallAttempt,
    answers: &[(String, f32)],
    outcome: &str,
) -> SurveyEventMessage {
    SurveyEventMessage {
        event_id,
        event_type,
        campaign_id: attempt.campaign_id,
        contact_id: contact.id,
        call_attempt_id: Some(attempt.id),
        call_id: Some(attempt.call_id),
        timestamp: Utc::now(),
        attempts_count: contact.attempts_count,
        answers: answers
            .iter()
            .enumerate()
            .map(|(i, (text, confidence))| SurveyAnswer {
                question_number: (i + 1) as u8,
                answer_text: text.clone(),
                confidence: Some(*confidence),
            })
            .collect(),
        outcome: outcome.to_string(),
        email: contact.email.clone(),
        locale: Some(contact.preferred_language.code().to_string()),
        payload_version: "1.0".to_string(),
    }
}

async fn publish_after_commit(bus: &dyn EventBus, message: Option<SurveyEventMessage>) {
    let Some(message) = message else { return };
    if let Err(failure) = publisher::publish_with_retry(bus, &message).await {
        tracing::error!(
            event_id = %message.event_id,
            error = %failure,
            "event publish exhausted retries; needs dead-letter reconciliation"
        );
    }
}

/// Routes a recognized-speech turn from the telephony provider through the
/// Dialogue Orchestrator, speaks the next prompt, and finalizes the call
/// attempt when the turn is terminal. Called from `handle_speech_event`,
/// the `WebhookEventType::SpeechRecognized` branch the HTTP layer dispatches
/// to instead of `ingest`, since a dialogue turn is not a `CallAttempt`
/// state transition on its own.
pub async fn handle_dialogue_turn(
    state: &WebhookState,
    call_id: Uuid,
    provider_call_id: &str,
    campaign: &crate::models::Campaign,
    utterance: &str,
) -> Result<(), WebhookError> {
    let turn = match state.dialogue.handle_utterance(call_id, campaign, utterance).await {
        Ok(turn) => turn,
        Err(_) => return Ok(()),
    };

    if !turn.speak_text.is_empty() {
        if let Err(err) = state
            .telephony
            .speak(provider_call_id, &turn.speak_text, campaign.language.code())
            .await
        {
            tracing::warn!(%call_id, error = %err, "failed to deliver dialogue prompt");
        }
    }

    // Persist whatever's been captured so far into CallAttempt.metadata
    // (spec.md §4.3 "Terminal output") so a provider terminal webhook that
    // lands before the orchestrator's own terminal turn can still recover
    // it (see `extract_dialogue_answers`).
    if let Some(snapshot) = state.dialogue.snapshot_answers(call_id).await {
        if let Some(attempt) = db::call_attempts::get_by_call_id(&state.pool, call_id).await? {
            let patch = json!({ "dialogue_answers": snapshot_to_json(&snapshot) });
            let mut tx = state.pool.begin().await?;
            db::call_attempts::merge_metadata(&mut tx, attempt.id, &patch).await?;
            tx.commit().await?;
        }
    }

    if let Some(terminal) = turn.terminal {
        let mut tx = state.pool.begin().await?;
        let Some(attempt) = db::call_attempts::get_by_call_id_for_update(&mut tx, call_id).await? else {
            return Ok(());
        };
        if attempt.is_terminal() {
            return Ok(());
        }

        // A session already in its Done/Refused/Failed phase reports
        // Completed with no answers on a stray re-entrant turn (e.g. a
        // retried webhook landing before `end_session` runs). Same rule as
        // the provider-terminal path: Completed with no captured answers
        // isn't a real completion.
        let outcome = if terminal.outcome == CallOutcome::Completed && terminal.answers.is_none() {
            CallOutcome::Failed
        } else {
            terminal.outcome
        };

        let message = finalize_terminal_attempt(
            &mut tx,
            &attempt,
            outcome,
            Utc::now(),
            None,
            "dialogue_orchestrator",
            terminal.answers,
        )
        .await?;
        tx.commit().await?;
        publish_after_commit(state.bus.as_ref(), message).await;
        state.dialogue.end_session(call_id).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_message_carries_answers_in_order() {
        let contact = Contact {
            id: 7,
            campaign_id: 1,
            phone: "+15550001".to_string(),
            email: Some("a@example.com".to_string()),
            preferred_language: crate::models::Language::En,
            has_prior_consent: false,
            do_not_call: false,
            state: ContactState::InProgress,
            attempts_count: 1,
            last_attempt_at: None,
            last_outcome: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let attempt = CallAttempt {
            id: 99,
            contact_id: 7,
            campaign_id: 1,
            attempt_number: 1,
            call_id: Uuid::new_v4(),
            provider_call_id: Some("abc".to_string()),
            started_at: Utc::now(),
            answered_at: Some(Utc::now()),
            ended_at: None,
            outcome: None,
            error_code: None,
            metadata: json!({}),
        };
        let answers = [("yes".to_string(), 0.9_f32)];
        let message = build_event_message(Uuid::new_v4(), SurveyEventType::Completed, &contact, &attempt, &answers, "completed");
        assert_eq!(message.answers.len(), 1);
        assert_eq!(message.answers[0].question_number, 1);
        assert_eq!(message.deduplication_key(), format!("survey.completed:7:99"));
    }

    #[test]
    fn extract_dialogue_answers_requires_three_non_empty() {
        let metadata = json!({ "dialogue_answers": [
            {"text": "yes", "confidence": 0.9},
            {"text": "12", "confidence": 0.8},
            {"text": "", "confidence": 0.0},
        ]});
        assert!(extract_dialogue_answers(&metadata).is_none());
    }

    #[test]
    fn extract_dialogue_answers_recovers_full_snapshot() {
        let metadata = json!({ "dialogue_answers": [
            {"text": "yes", "confidence": 0.9},
            {"text": "12", "confidence": 0.8},
            {"text": "great", "confidence": 0.7},
        ]});
        let answers = extract_dialogue_answers(&metadata).expect("three answers captured");
        assert_eq!(answers[0].0, "yes");
        assert_eq!(answers[2].0, "great");
    }

    #[test]
    fn extract_dialogue_answers_none_when_missing() {
        assert!(extract_dialogue_answers(&json!({})).is_none());
    }
}
