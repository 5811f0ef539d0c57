//! Call Scheduler: periodic tick converting eligible contacts into fresh
//! `CallAttempt`s under campaign-level concurrency/window/retry/exclusion
//! constraints. Grounded in `server/automation.rs`'s `run_campaign_loop`,
//! fixed to add `FOR UPDATE SKIP LOCKED` (absent in the teacher) and
//! single-leader execution via `pg_try_advisory_lock`. Result-summary shape
//! grounded in
//! `original_source/runs/kit/REQ-010/.../calling/scheduler/models.py`
//! (`SchedulerRunResult`, `ScheduledAttempt`, `SchedulerSettings`).

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{Campaign, CampaignStatus};
use crate::telephony::{CallMetadata, OutboundCallRequest, QuestionSpec, TelephonyProvider};
use crate::webhook;

/// Mirrors the Python `SchedulerSettings.__post_init__` validation: both
/// factors must be positive.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub caller_id: String,
    pub callback_url: String,
    pub max_concurrent_calls: i64,
    pub prefetch_factor: i64,
    pub lock_key: i64,
    pub tick_interval_seconds: u64,
}

impl SchedulerSettings {
    pub fn new(
        caller_id: String,
        callback_url: String,
        max_concurrent_calls: i64,
        prefetch_factor: i64,
        lock_key: i64,
        tick_interval_seconds: u64,
    ) -> Result<Self, SchedulerError> {
        if max_concurrent_calls <= 0 {
            return Err(SchedulerError::InvalidSettings("max_concurrent_calls must be > 0".into()));
        }
        if prefetch_factor < 1 {
            return Err(SchedulerError::InvalidSettings("prefetch_factor must be >= 1".into()));
        }
        if !(5..=3600).contains(&tick_interval_seconds) {
            return Err(SchedulerError::InvalidSettings("tick_interval_seconds must be 5-3600".into()));
        }
        Ok(Self { caller_id, callback_url, max_concurrent_calls, prefetch_factor, lock_key, tick_interval_seconds })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid scheduler settings: {0}")]
    InvalidSettings(String),
    #[error("telephony adapter error: {0}")]
    Adapter(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct ScheduledAttempt {
    pub contact_id: i64,
    pub call_attempt_id: i64,
    pub call_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerRunResult {
    pub scheduled: Vec<ScheduledAttempt>,
    pub skipped_contacts: Vec<i64>,
    pub capacity_exhausted: bool,
    pub fetched_candidates: i64,
    pub available_capacity: i64,
}

pub struct Scheduler {
    pool: PgPool,
    telephony: Arc<dyn TelephonyProvider>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(pool: PgPool, telephony: Arc<dyn TelephonyProvider>, settings: SchedulerSettings) -> Self {
        Self { pool, telephony, settings }
    }

    /// Runs ticks on a fixed interval until the process is shut down.
    pub async fn run_forever(&self) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.settings.tick_interval_seconds));
        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(result) => {
                    tracing::info!(
                        scheduled = result.scheduled.len(),
                        skipped = result.skipped_contacts.len(),
                        capacity_exhausted = result.capacity_exhausted,
                        fetched = result.fetched_candidates,
                        available = result.available_capacity,
                        "scheduler tick complete"
                    );
                }
                Err(err) => tracing::error!(error = %err, "scheduler tick failed"),
            }
        }
    }

    /// One scheduling tick (spec.md §4.1 steps 1-6).
    pub async fn tick(&self) -> Result<SchedulerRunResult, SchedulerError> {
        // Session-level advisory locks are held by the backend connection
        // that took them, not by the pool; acquire-and-unlock must run on
        // the same checked-out connection or the unlock silently no-ops
        // and the lock is never released.
        let mut lock_conn = self.pool.acquire().await?;
        let lock_acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(self.settings.lock_key)
            .fetch_one(&mut *lock_conn)
            .await?;
        if !lock_acquired.0 {
            tracing::debug!("scheduler lock held elsewhere; skipping tick");
            return Ok(SchedulerRunResult::default());
        }

        let result = self.tick_locked().await;

        let _: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .bind(self.settings.lock_key)
            .fetch_one(&mut *lock_conn)
            .await?;

        result
    }

    async fn tick_locked(&self) -> Result<SchedulerRunResult, SchedulerError> {
        let in_flight = db::call_attempts::count_in_flight(&self.pool).await?;
        let mut available = self.settings.max_concurrent_calls - in_flight;
        if available <= 0 {
            return Ok(SchedulerRunResult { capacity_exhausted: true, available_capacity: 0, ..Default::default() });
        }

        let campaigns = db::campaigns::get_running(&self.pool).await?;
        let mut result = SchedulerRunResult::default();
        let mut to_dial: Vec<(Campaign, ScheduledAttempt)> = Vec::new();

        for campaign in campaigns {
            if campaign.status != CampaignStatus::Running || available <= 0 {
                continue;
            }

            let now_local_time = local_time_in(&campaign.timezone);
            let limit = available * self.settings.prefetch_factor;

            let mut tx = self.pool.begin().await?;
            let candidates = db::contacts::select_eligible_candidates(
                &mut tx,
                campaign.id,
                now_local_time,
                campaign.call_window_start,
                campaign.call_window_end,
                campaign.retry_interval_minutes,
                campaign.max_attempts,
                limit,
            )
            .await?;
            result.fetched_candidates += candidates.len() as i64;

            for contact in candidates {
                if available <= 0 {
                    break;
                }
                // Condition (8) re-check: `FOR UPDATE SKIP LOCKED` protects
                // the contact row, not the call_attempts table, so another
                // in-flight attempt for this contact (raced in between
                // candidate selection and this point) must be excluded
                // explicitly.
                if db::contacts::has_active_attempt(&mut tx, contact.id).await? {
                    result.skipped_contacts.push(contact.id);
                    continue;
                }

                let call_id = Uuid::new_v4();
                let attempt = db::call_attempts::insert(
                    &mut tx,
                    contact.id,
                    campaign.id,
                    contact.attempts_count + 1,
                    call_id,
                )
                .await?;
                db::contacts::mark_dialing(&mut tx, contact.id, Utc::now()).await?;

                let scheduled = ScheduledAttempt { contact_id: contact.id, call_attempt_id: attempt.id, call_id };
                result.scheduled.push(scheduled.clone());
                to_dial.push((campaign.clone(), scheduled));
                available -= 1;
            }
            tx.commit().await?;
        }

        result.available_capacity = available;

        // Step 5: hand each newly scheduled attempt to the Telephony
        // Adapter outside the transaction that queued it, so a slow
        // provider call never holds a row lock open.
        for (campaign, scheduled) in &to_dial {
            if let Err(err) = self.dial(campaign, scheduled).await {
                tracing::warn!(call_id = %scheduled.call_id, error = %err, "adapter dial failed");
            }
        }

        Ok(result)
    }

    /// Hands one scheduled attempt to the Telephony Adapter. On failure,
    /// finalizes the attempt as `failed` via the same contact-resolution
    /// path the webhook ingestor uses (open question (ii)).
    async fn dial(&self, campaign: &Campaign, scheduled: &ScheduledAttempt) -> Result<(), SchedulerError> {
        let Some(attempt) = db::call_attempts::get_by_call_id(&self.pool, scheduled.call_id).await? else {
            return Ok(());
        };
        let Some(contact) = db::contacts::get_by_id(&self.pool, scheduled.contact_id).await? else {
            return Ok(());
        };

        let request = OutboundCallRequest {
            to: contact.phone.clone(),
            from: self.settings.caller_id.clone(),
            language: contact.preferred_language.code().to_string(),
            callback_url: self.settings.callback_url.clone(),
            intro_script: campaign.intro_script.clone(),
            questions: (1..=3)
                .filter_map(|position| {
                    Some(QuestionSpec {
                        position,
                        text: campaign.question_text(position)?.to_string(),
                        answer_type: format!("{:?}", campaign.question_type(position)?).to_lowercase(),
                    })
                })
                .collect(),
            metadata: CallMetadata { call_id: scheduled.call_id, campaign_id: campaign.id, contact_id: contact.id },
        };

        match self.telephony.start_outbound_call(request).await {
            Ok(response) => {
                let mut tx = self.pool.begin().await?;
                db::call_attempts::set_provider_call_id(&mut tx, attempt.id, &response.provider_call_id).await?;
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                let mut tx = self.pool.begin().await?;
                webhook::finalize_terminal_attempt(
                    &mut tx,
                    &attempt,
                    crate::models::CallOutcome::Failed,
                    Utc::now(),
                    Some("adapter_error"),
                    &err.to_string(),
                    None,
                )
                .await?;
                tx.commit().await?;
                Err(SchedulerError::Adapter(err.to_string()))
            }
        }
    }
}

fn local_time_in(timezone: &str) -> chrono::NaiveTime {
    match chrono_tz::Tz::from_str(timezone) {
        Ok(tz) => Utc::now().with_timezone(&tz).time(),
        Err(_) => {
            tracing::warn!(timezone, "unrecognized campaign timezone; falling back to UTC");
            Utc::now().time()
        }
    }
}
