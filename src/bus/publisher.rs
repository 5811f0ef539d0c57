//! Survey Event Publisher: emits exactly one of
//! `{survey.completed, survey.refused, survey.not_reached}` per terminal
//! call-attempt outcome. The `Event` row is written inside the webhook
//! ingestor's transaction (see `webhook::apply_terminal_event`); this
//! module only concerns itself with the publish-after-commit step and its
//! retry policy, mirroring the DB-write/bus-publish split in
//! `original_source/.../events/bus/publisher.py`.

use std::time::Duration;

use super::{BusError, EventBus, SurveyEventMessage};

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
#[error("failed to publish event after {attempts} attempts: {last_error}")]
pub struct PublishFailure {
    pub attempts: u32,
    pub last_error: BusError,
}

/// Retries with exponential backoff (base 1s, cap 60s, max 5 attempts) per
/// spec.md §4.4. On persistent failure the caller is expected to mark the
/// row for dead-letter reconciliation rather than retry forever.
pub async fn publish_with_retry(
    bus: &dyn EventBus,
    message: &SurveyEventMessage,
) -> Result<String, PublishFailure> {
    let mut last_error = None;
    for attempt in 0..MAX_ATTEMPTS {
        match bus.publish(message).await {
            Ok(message_id) => return Ok(message_id),
            Err(err) => {
                tracing::warn!(attempt, event_id = %message.event_id, error = %err, "event publish failed");
                last_error = Some(err);
                if attempt + 1 < MAX_ATTEMPTS {
                    let delay = backoff_delay(attempt);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(PublishFailure {
        attempts: MAX_ATTEMPTS,
        last_error: last_error.expect("loop always records an error before exiting"),
    })
}

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = BASE_DELAY.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    scaled.min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(10), Duration::from_secs(60));
    }
}
