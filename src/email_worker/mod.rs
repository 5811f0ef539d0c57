//! Email Worker: long-polls the Event Bus and sends the configured
//! notification per terminal survey outcome. Grounded in `server/email.rs`
//! (`EmailService`'s SMTP transport construction), fixed to build a true
//! `MultiPart::alternative()` message — the teacher accepts a `text_body`
//! parameter and then discards it, sending HTML-only. Loop/retry contract
//! grounded in spec.md §4.5 and
//! `original_source/runs/codex.kit/REQ-006/.../notifications/email/provider.py`.

pub mod templates;

use std::sync::Arc;
use std::time::Duration;

use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sqlx::PgPool;

use crate::bus::{EventBus, SurveyEventMessage};
use crate::db;
use crate::models::EmailNotificationStatus;
use templates::{RenderedEmail, TemplateRenderer};

const MAX_BATCH: i32 = 10;
const LONG_POLL_WAIT_SECONDS: i32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("failed to build email message: {0}")]
    MessageBuild(String),
    #[error("failed to send email: {0}")]
    SendFailed(String),
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
}

/// Capability interface so the worker's retry/idempotency logic can be
/// exercised against a fake sender instead of live SMTP.
#[async_trait::async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, rendered: &RenderedEmail) -> Result<String, EmailError>;
}

pub struct SmtpEmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        smtp_username: &str,
        smtp_password: &str,
        from_email: &str,
        from_name: &str,
    ) -> Result<Self, EmailError> {
        let from: Mailbox = format!("{from_name} <{from_email}>")
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("invalid from address: {e}")))?;

        let tls_parameters = TlsParameters::builder(smtp_host.to_string())
            .build()
            .map_err(|e| EmailError::MessageBuild(format!("tls parameters: {e}")))?;
        let credentials = Credentials::new(smtp_username.to_string(), smtp_password.to_string());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| EmailError::MessageBuild(format!("smtp transport: {e}")))?
            .port(smtp_port)
            .credentials(credentials)
            .tls(Tls::Required(tls_parameters))
            .build();

        Ok(Self { mailer, from })
    }
}

#[async_trait::async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, rendered: &RenderedEmail) -> Result<String, EmailError> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("invalid recipient address: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject(&rendered.subject)
            .multipart(MultiPart::alternative().singlepart(SinglePart::plain(rendered.text_body.clone())).singlepart(
                SinglePart::html(rendered.html_body.clone()),
            ))
            .map_err(|e| EmailError::MessageBuild(e.to_string()))?;

        let response = self.mailer.send(email).await.map_err(|e| EmailError::SendFailed(e.to_string()))?;
        Ok(response.message().next().unwrap_or("").to_string())
    }
}

pub struct EmailWorkerSettings {
    pub max_retries: i32,
}

pub struct EmailWorker {
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    sender: Arc<dyn EmailSender>,
    renderer: TemplateRenderer,
    settings: EmailWorkerSettings,
}

impl EmailWorker {
    pub fn new(
        pool: PgPool,
        bus: Arc<dyn EventBus>,
        sender: Arc<dyn EmailSender>,
        settings: EmailWorkerSettings,
    ) -> Self {
        Self { pool, bus, sender, renderer: TemplateRenderer::new(), settings }
    }

    pub async fn run_forever(&self) {
        loop {
            if let Err(err) = self.poll_once().await {
                tracing::error!(error = %err, "email worker poll failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// Runs a single long-poll batch. Exposed separately from
    /// `run_forever` so a `--once` CLI invocation (and tests) can drive one
    /// cycle deterministically.
    pub async fn poll_once(&self) -> Result<(), sqlx::Error> {
        let messages = self
            .bus
            .receive(MAX_BATCH, LONG_POLL_WAIT_SECONDS)
            .await
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

        for queue_message in messages {
            let event: SurveyEventMessage = match serde_json::from_str(&queue_message.body) {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "unparseable survey event; dead-lettering");
                    let _ = self.bus.delete(&queue_message.receipt_handle).await;
                    continue;
                }
            };

            match self.process_event(&event).await {
                Ok(acked) => {
                    if acked {
                        let _ = self.bus.delete(&queue_message.receipt_handle).await;
                    }
                    // else: leave un-acked for redelivery after the
                    // queue's visibility timeout.
                }
                Err(err) => {
                    tracing::error!(event_id = %event.event_id, error = %err, "failed processing survey event");
                }
            }
        }

        Ok(())
    }

    /// Returns `true` if the message should be acknowledged (deleted from
    /// the queue), `false` if it should be left for redelivery.
    async fn process_event(&self, event: &SurveyEventMessage) -> Result<bool, sqlx::Error> {
        let Some(campaign) = db::campaigns::get_by_id(&self.pool, event.campaign_id).await? else {
            tracing::warn!(campaign_id = event.campaign_id, "no campaign for survey event; acknowledging");
            return Ok(true);
        };
        let Some(contact) = db::contacts::get_by_id(&self.pool, event.contact_id).await? else {
            tracing::warn!(contact_id = event.contact_id, "no contact for survey event; acknowledging");
            return Ok(true);
        };
        let Some(to_email) = contact.email.clone().or_else(|| event.email.clone()) else {
            return Ok(true);
        };

        let Some(template_id) = TemplateRenderer::resolve_template_id(
            event.event_type,
            campaign.email_template_id.as_deref(),
            campaign.retry_template_id.as_deref(),
        ) else {
            tracing::debug!(campaign_id = campaign.id, "no template configured for event type; no-op");
            return Ok(true);
        };
        let Some(template) = self.renderer.get(&template_id) else {
            tracing::warn!(template_id, "configured template id not registered; no-op");
            return Ok(true);
        };

        let notification = db::email_notifications::get_or_create_pending(
            &self.pool,
            event.event_id,
            contact.id,
            campaign.id,
            &template_id,
            &to_email,
        )
        .await?;
        if notification.status == EmailNotificationStatus::Sent {
            return Ok(true);
        }

        let campaign_payload = serde_json::json!({ "id": campaign.id, "name": campaign.name });
        let contact_payload = serde_json::json!({ "id": contact.id, "phone": contact.phone, "email": contact.email });

        let rendered = match self.renderer.render(template, event, &campaign_payload, &contact_payload) {
            Ok(rendered) => rendered,
            Err(err) => {
                tracing::error!(event_id = %event.event_id, error = %err, "template render failed");
                return Ok(true);
            }
        };

        match self.sender.send(&to_email, &rendered).await {
            Ok(provider_message_id) => {
                db::email_notifications::mark_sent(&self.pool, notification.id, &provider_message_id).await?;
                Ok(true)
            }
            Err(err) => {
                let status = db::email_notifications::record_failure(
                    &self.pool,
                    notification.id,
                    &err.to_string(),
                    self.settings.max_retries,
                )
                .await?;
                Ok(status == EmailNotificationStatus::Failed)
            }
        }
    }
}
