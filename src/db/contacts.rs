//! Contact database operations.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{CallOutcome, Contact, ContactState};

const COLUMNS: &str = r#"
    id, campaign_id, phone, email, preferred_language, has_prior_consent,
    do_not_call, state, attempts_count, last_attempt_at, last_outcome,
    created_at, updated_at
"#;

pub async fn get_by_id(pool: &PgPool, id: i64) -> Result<Option<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>(&format!("SELECT {COLUMNS} FROM contacts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Same as `get_by_id`, row-locked within the caller's transaction so the
/// webhook state machine reads and writes the contact atomically alongside
/// the call attempt it is resolving.
pub async fn get_by_id_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> Result<Option<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>(&format!("SELECT {COLUMNS} FROM contacts WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
}

/// Select up to `limit` eligible candidate contacts under row locks,
/// ordered per spec.md §4.1 step 3. Eligibility conditions (1)-(7) are
/// checked here; condition (8) (no non-terminal attempt) is re-checked by
/// the caller inside the same transaction immediately before insert, since
/// `FOR UPDATE SKIP LOCKED` only protects the `contacts` row itself.
///
/// The call window check uses the half-open interval `[start, end)`
/// (B1): a tick exactly at `end` is not eligible.
#[allow(clippy::too_many_arguments)]
pub async fn select_eligible_candidates(
    tx: &mut Transaction<'_, Postgres>,
    campaign_id: i64,
    now_local_time: chrono::NaiveTime,
    call_window_start: chrono::NaiveTime,
    call_window_end: chrono::NaiveTime,
    retry_interval_minutes: i32,
    max_attempts: i32,
    limit: i64,
) -> Result<Vec<Contact>, sqlx::Error> {
    // Window check happens here, not in SQL bind order: callers are
    // expected to skip the query entirely when `now` falls outside
    // `[call_window_start, call_window_end)`, since that is a whole-tick
    // decision, not a per-contact one. We still enforce it defensively.
    if now_local_time < call_window_start || now_local_time >= call_window_end {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Contact>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM contacts c
        WHERE c.campaign_id = $1
          AND c.state = 'pending'
          AND c.do_not_call = FALSE
          AND c.attempts_count < $2
          AND (
              c.last_attempt_at IS NULL
              OR NOW() - c.last_attempt_at >= make_interval(mins => $3)
          )
          AND NOT EXISTS (
              SELECT 1 FROM exclusion_list_entries e WHERE e.phone = c.phone
          )
        ORDER BY c.attempts_count ASC, c.last_attempt_at ASC NULLS FIRST, c.id ASC
        LIMIT $4
        FOR UPDATE SKIP LOCKED
        "#
    ))
    .bind(campaign_id)
    .bind(max_attempts)
    .bind(retry_interval_minutes)
    .bind(limit)
    .fetch_all(&mut **tx)
    .await
}

/// I2: true iff the contact currently has a non-terminal call attempt.
pub async fn has_active_attempt(
    tx: &mut Transaction<'_, Postgres>,
    contact_id: i64,
) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM call_attempts WHERE contact_id = $1 AND outcome IS NULL LIMIT 1",
    )
    .bind(contact_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.is_some())
}

pub async fn mark_dialing(
    tx: &mut Transaction<'_, Postgres>,
    contact_id: i64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE contacts
        SET state = 'in_progress', attempts_count = attempts_count + 1,
            last_attempt_at = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(contact_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn set_state(
    pool: &PgPool,
    contact_id: i64,
    state: ContactState,
    last_outcome: Option<CallOutcome>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE contacts SET state = $2, last_outcome = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(contact_id)
    .bind(state)
    .bind(last_outcome)
    .execute(pool)
    .await?;
    Ok(())
}

/// Same as `set_state` but participates in the caller's transaction, used
/// by the webhook state machine so the contact transition and the event
/// insert commit atomically.
pub async fn set_state_tx(
    tx: &mut Transaction<'_, Postgres>,
    contact_id: i64,
    state: ContactState,
    last_outcome: Option<CallOutcome>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE contacts SET state = $2, last_outcome = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(contact_id)
    .bind(state)
    .bind(last_outcome)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
