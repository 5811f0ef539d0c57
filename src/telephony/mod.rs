//! Telephony Adapter: normalizes a provider's outbound-call request/response
//! and webhook payloads into domain types. Generalized from the teacher's
//! Telnyx-specific client to the provider-neutral contract in spec.md §6,
//! following the shape of
//! `original_source/.../calling/telephony/provider.py::HttpTelephonyProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TelephonyError {
    #[error("telephony provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telephony provider returned no call_id")]
    MissingCallId,
    #[error("telephony provider error: {status} {message}")]
    Provider { status: u16, message: String },
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("unparseable webhook payload: {0}")]
    UnparseablePayload(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionSpec {
    pub position: u8,
    pub text: String,
    pub answer_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallMetadata {
    pub call_id: Uuid,
    pub campaign_id: i64,
    pub contact_id: i64,
}

/// Outbound-call request, matching spec.md §6 exactly:
/// `{to, from, language, callback_url, intro_script, questions, metadata}`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundCallRequest {
    pub to: String,
    pub from: String,
    pub language: String,
    pub callback_url: String,
    pub intro_script: String,
    pub questions: Vec<QuestionSpec>,
    pub metadata: CallMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboundCallResponse {
    pub provider_call_id: String,
    pub status: String,
}

/// A provider webhook event, normalized from raw headers/body into the
/// domain shape spec.md §4.2 requires of the adapter.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_type: WebhookEventType,
    pub provider_call_id: String,
    pub call_id: Option<Uuid>,
    pub campaign_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub raw_status: String,
    pub ts: chrono::DateTime<chrono::Utc>,
    /// Transcribed caller speech, present only on a `SpeechRecognized` event
    /// — the provider's speech-recognition callback feeding the Dialogue
    /// Orchestrator one turn at a time.
    pub utterance: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventType {
    Initiated,
    Ringing,
    Answered,
    SpeechRecognized,
    Completed,
    Failed,
    NoAnswer,
    Busy,
}

/// Capability interface for outbound dialing + webhook parsing (spec.md §9
/// "protocol-typed dependencies": provider-specific payloads live in
/// `raw_payload` and never leak across this boundary).
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    async fn start_outbound_call(
        &self,
        request: OutboundCallRequest,
    ) -> Result<OutboundCallResponse, TelephonyError>;

    /// Validates the provider's webhook signature header against the raw
    /// body. Must run before `parse_webhook_event`.
    fn validate_signature(&self, raw_body: &[u8], signature: Option<&str>) -> bool;

    fn parse_webhook_event(&self, raw_body: &[u8]) -> Result<WebhookEvent, TelephonyError>;

    /// Delivers `text` as speech on the live call identified by
    /// `provider_call_id` — the Dialogue Orchestrator's mechanism for
    /// asking the consent question and delivering Q1-Q3 (teacher's
    /// `TelnyxClient::speak`, generalized off the Telnyx endpoint shape).
    async fn speak(&self, provider_call_id: &str, text: &str, language: &str) -> Result<(), TelephonyError>;
}

/// Default HTTP-based implementation, grounded in `TelnyxClient`'s
/// reqwest-based construction but speaking the generic contract from
/// `HttpTelephonyProvider` in original_source rather than Telnyx's own
/// endpoint shapes.
pub struct HttpTelephonyProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    webhook_signing_secret: Option<String>,
}

impl HttpTelephonyProvider {
    pub fn new(base_url: String, api_key: String, webhook_signing_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            webhook_signing_secret,
        }
    }
}

#[async_trait]
impl TelephonyProvider for HttpTelephonyProvider {
    async fn start_outbound_call(
        &self,
        request: OutboundCallRequest,
    ) -> Result<OutboundCallResponse, TelephonyError> {
        let url = format!("{}/calls", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Provider { status, message });
        }

        let parsed: OutboundCallResponse = response.json().await?;
        if parsed.provider_call_id.is_empty() {
            return Err(TelephonyError::MissingCallId);
        }
        Ok(parsed)
    }

    fn validate_signature(&self, raw_body: &[u8], signature: Option<&str>) -> bool {
        match (&self.webhook_signing_secret, signature) {
            (None, _) => true,
            (Some(_secret), None) => false,
            (Some(secret), Some(signature)) => {
                use hmac::{Hmac, Mac};
                use sha2::Sha256;
                let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
                    return false;
                };
                mac.update(raw_body);
                let expected = hex::encode(mac.finalize().into_bytes());
                expected == signature
            }
        }
    }

    fn parse_webhook_event(&self, raw_body: &[u8]) -> Result<WebhookEvent, TelephonyError> {
        let payload: RawWebhookPayload = serde_json::from_slice(raw_body)
            .map_err(|e| TelephonyError::UnparseablePayload(e.to_string()))?;
        payload.try_into()
    }

    async fn speak(&self, provider_call_id: &str, text: &str, language: &str) -> Result<(), TelephonyError> {
        #[derive(Serialize)]
        struct SpeakRequest<'a> {
            payload: &'a str,
            language: &'a str,
        }
        let url = format!("{}/calls/{}/actions/speak", self.base_url, provider_call_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SpeakRequest { payload: text, language })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Provider { status, message });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawWebhookPayload {
    event_type: String,
    provider_call_id: String,
    call_id: Option<Uuid>,
    campaign_id: Option<i64>,
    contact_id: Option<i64>,
    duration_seconds: Option<i64>,
    error_code: Option<String>,
    error_message: Option<String>,
    #[serde(default)]
    raw_status: Option<String>,
    #[serde(default)]
    ts: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    utterance: Option<String>,
}

impl TryFrom<RawWebhookPayload> for WebhookEvent {
    type Error = TelephonyError;

    fn try_from(p: RawWebhookPayload) -> Result<Self, Self::Error> {
        let event_type = match p.event_type.as_str() {
            "initiated" => WebhookEventType::Initiated,
            "ringing" => WebhookEventType::Ringing,
            "answered" => WebhookEventType::Answered,
            "speech_recognized" => WebhookEventType::SpeechRecognized,
            "completed" => WebhookEventType::Completed,
            "failed" => WebhookEventType::Failed,
            "no_answer" => WebhookEventType::NoAnswer,
            "busy" => WebhookEventType::Busy,
            other => return Err(TelephonyError::UnparseablePayload(format!("unknown event_type {other}"))),
        };
        Ok(WebhookEvent {
            event_type,
            raw_status: p.raw_status.unwrap_or_else(|| p.event_type.clone()),
            provider_call_id: p.provider_call_id,
            call_id: p.call_id,
            campaign_id: p.campaign_id,
            contact_id: p.contact_id,
            duration_seconds: p.duration_seconds,
            error_code: p.error_code,
            error_message: p.error_message,
            ts: p.ts.unwrap_or_else(chrono::Utc::now),
            utterance: p.utterance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_event_types() {
        let raw = br#"{"event_type":"answered","provider_call_id":"abc","call_id":"11111111-1111-1111-1111-111111111111"}"#;
        let payload: RawWebhookPayload = serde_json::from_slice(raw).unwrap();
        let event: WebhookEvent = payload.try_into().unwrap();
        assert_eq!(event.event_type, WebhookEventType::Answered);
        assert!(event.call_id.is_some());
    }

    #[test]
    fn rejects_unknown_event_type() {
        let raw = br#"{"event_type":"teleported","provider_call_id":"abc"}"#;
        let payload: RawWebhookPayload = serde_json::from_slice(raw).unwrap();
        let result: Result<WebhookEvent, _> = payload.try_into();
        assert!(result.is_err());
    }

    #[test]
    fn no_signing_secret_always_validates() {
        let provider = HttpTelephonyProvider::new("https://example.test".into(), "key".into(), None);
        assert!(provider.validate_signature(b"body", None));
    }
}
