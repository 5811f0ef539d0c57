//! Event Bus Adapter: FIFO queue publish/consume with group-id and
//! deduplication-id. Grounded in
//! `examples/original_source/runs/codex.kit/REQ-006/src/app/infra/messaging/sqs.py`
//! and `.../events/bus/models.py` — none of the teacher's dependencies
//! cover a message bus, so `aws-sdk-sqs` is a genuine new addition (see
//! DESIGN.md).

pub mod publisher;

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::Client as SqsClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SurveyEventType;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus publish failed: {0}")]
    Publish(String),
    #[error("bus receive failed: {0}")]
    Receive(String),
    #[error("bus delete failed: {0}")]
    Delete(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyAnswer {
    pub question_number: u8,
    pub answer_text: String,
    pub confidence: Option<f32>,
}

/// Exactly matches `SurveyEventMessage` in
/// `original_source/.../events/bus/models.py`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyEventMessage {
    pub event_id: Uuid,
    pub event_type: SurveyEventType,
    pub campaign_id: i64,
    pub contact_id: i64,
    pub call_attempt_id: Option<i64>,
    pub call_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub attempts_count: i32,
    pub answers: Vec<SurveyAnswer>,
    pub outcome: String,
    pub email: Option<String>,
    pub locale: Option<String>,
    pub payload_version: String,
}

impl SurveyEventMessage {
    pub fn deduplication_key(&self) -> String {
        let tail = self
            .call_attempt_id
            .map(|id| id.to_string())
            .or_else(|| self.call_id.map(|id| id.to_string()))
            .unwrap_or_else(|| "na".to_string());
        format!("{}:{}:{}", self.event_type.as_str(), self.contact_id, tail)
    }

    pub fn message_group_id(&self) -> String {
        self.campaign_id.to_string()
    }

    pub fn to_message_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("event_type".to_string(), self.event_type.as_str().to_string());
        attrs.insert("campaign_id".to_string(), self.campaign_id.to_string());
        attrs.insert("contact_id".to_string(), self.contact_id.to_string());
        attrs.insert("payload_version".to_string(), self.payload_version.clone());
        attrs
    }
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

/// Capability interface so the publisher and the email worker can be
/// tested against a fake bus instead of live SQS.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, message: &SurveyEventMessage) -> Result<String, BusError>;
    async fn receive(&self, max_messages: i32, wait_time_seconds: i32) -> Result<Vec<QueueMessage>, BusError>;
    async fn delete(&self, receipt_handle: &str) -> Result<(), BusError>;
}

pub struct SqsEventBus {
    client: SqsClient,
    queue_url: String,
}

impl SqsEventBus {
    pub fn new(client: SqsClient, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl EventBus for SqsEventBus {
    async fn publish(&self, message: &SurveyEventMessage) -> Result<String, BusError> {
        let body = serde_json::to_string(message).map_err(|e| BusError::Publish(e.to_string()))?;
        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .message_group_id(message.message_group_id())
            .message_deduplication_id(message.deduplication_key());

        for (key, value) in message.to_message_attributes() {
            request = request.message_attributes(
                key,
                aws_sdk_sqs::types::MessageAttributeValue::builder()
                    .data_type("String")
                    .string_value(value)
                    .build()
                    .map_err(|e| BusError::Publish(e.to_string()))?,
            );
        }

        let output = request.send().await.map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn receive(&self, max_messages: i32, wait_time_seconds: i32) -> Result<Vec<QueueMessage>, BusError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_time_seconds)
            .send()
            .await
            .map_err(|e| BusError::Receive(e.to_string()))?;

        Ok(output
            .messages()
            .iter()
            .filter_map(|m| {
                Some(QueueMessage {
                    message_id: m.message_id()?.to_string(),
                    receipt_handle: m.receipt_handle()?.to_string(),
                    body: m.body()?.to_string(),
                })
            })
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), BusError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| BusError::Delete(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> SurveyEventMessage {
        SurveyEventMessage {
            event_id: Uuid::new_v4(),
            event_type: SurveyEventType::Completed,
            campaign_id: 42,
            contact_id: 7,
            call_attempt_id: Some(99),
            call_id: None,
            timestamp: Utc::now(),
            attempts_count: 1,
            answers: vec![],
            outcome: "completed".to_string(),
            email: None,
            locale: Some("en".to_string()),
            payload_version: "1.0".to_string(),
        }
    }

    #[test]
    fn deduplication_key_prefers_call_attempt_id() {
        let message = sample_message();
        assert_eq!(message.deduplication_key(), "survey.completed:7:99");
    }

    #[test]
    fn deduplication_key_falls_back_to_na() {
        let mut message = sample_message();
        message.call_attempt_id = None;
        message.call_id = None;
        assert_eq!(message.deduplication_key(), "survey.completed:7:na");
    }

    #[test]
    fn message_group_id_is_campaign_id() {
        let message = sample_message();
        assert_eq!(message.message_group_id(), "42");
    }
}
