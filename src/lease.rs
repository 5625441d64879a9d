//! Claim/heartbeat lease over running runs.
//!
//! A claim is a read-check-write on one run row inside an IMMEDIATE
//! transaction, with the write guarded by the row version. Two agents racing
//! for the same run therefore cannot both observe it unclaimed and both win.
//!
//! Each change of holder bumps `lease_epoch`. Holders may present the
//! resulting [`LeaseToken`] on heartbeat and completion so a holder whose
//! lease was taken over (a paused or partitioned agent) is turned away.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::domain::{LeaseToken, Run, RunStatus};
use crate::error::Result;
use crate::store::runs;

/// What a claim attempt would do to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimVerdict {
    /// Unclaimed run; new holder
    Acquire,
    /// Same agent re-claiming its own lease
    Renew,
    /// Previous holder's lease expired
    TakeOver,
    /// Another agent holds a live lease
    Held,
    /// Run is not running
    NotRunning,
}

impl ClaimVerdict {
    pub fn is_granted(&self) -> bool {
        matches!(self, ClaimVerdict::Acquire | ClaimVerdict::Renew | ClaimVerdict::TakeOver)
    }
}

/// Response to a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub success: bool,
    /// Holder after the attempt
    pub claimed_by: Option<String>,
    /// TTL in seconds the caller asked for
    pub expires_in: u64,
    /// Fencing epoch after the attempt
    pub epoch: i64,
}

impl ClaimOutcome {
    /// Token to present on heartbeat/complete; only set on success.
    pub fn token(&self) -> Option<LeaseToken> {
        if !self.success {
            return None;
        }
        self.claimed_by.as_ref().map(|agent| LeaseToken::new(agent.clone(), self.epoch))
    }
}

/// Whether the lease on `run` has gone longer than `ttl` without a heartbeat.
pub fn is_expired(run: &Run, ttl: Duration, now: DateTime<Utc>) -> bool {
    match run.heartbeat_at {
        Some(at) => now - at > ttl,
        None => false,
    }
}

/// Decide a claim without touching storage.
pub fn evaluate_claim(run: &Run, agent_id: &str, ttl: Duration, now: DateTime<Utc>) -> ClaimVerdict {
    if run.status != RunStatus::Running {
        return ClaimVerdict::NotRunning;
    }
    match run.claimed_by.as_deref() {
        None => ClaimVerdict::Acquire,
        Some(holder) if holder == agent_id => ClaimVerdict::Renew,
        Some(_) if is_expired(run, ttl, now) => ClaimVerdict::TakeOver,
        Some(_) => ClaimVerdict::Held,
    }
}

/// Whether `token` (if any) matches the current holder and epoch.
pub fn token_is_current(run: &Run, agent_id: &str, token: Option<&LeaseToken>) -> bool {
    if run.claimed_by.as_deref() != Some(agent_id) {
        return false;
    }
    match token {
        Some(token) => token.agent_id == agent_id && token.epoch == run.lease_epoch,
        None => true,
    }
}

/// Claim `run_id` for `agent_id`. Must run inside a write transaction.
pub fn claim_in(
    conn: &Connection,
    run_id: i64,
    agent_id: &str,
    ttl_seconds: u64,
    now: DateTime<Utc>,
) -> Result<ClaimOutcome> {
    let run = runs::require(conn, run_id)?;
    let ttl = Duration::seconds(ttl_seconds.min(i64::MAX as u64 / 1000) as i64);
    let verdict = evaluate_claim(&run, agent_id, ttl, now);

    if !verdict.is_granted() {
        tracing::debug!(
            run_id,
            agent_id,
            holder = ?run.claimed_by,
            verdict = ?verdict,
            "Claim rejected"
        );
        return Ok(ClaimOutcome {
            success: false,
            claimed_by: run.claimed_by,
            expires_in: ttl_seconds,
            epoch: run.lease_epoch,
        });
    }

    let mut claimed = run.clone();
    if verdict != ClaimVerdict::Renew {
        claimed.lease_epoch += 1;
    }
    claimed.claimed_by = Some(agent_id.to_string());
    if claimed.claimed_at.is_none() {
        claimed.claimed_at = Some(now);
    }
    claimed.heartbeat_at = Some(now);
    let saved = runs::save(conn, &claimed)?;

    match verdict {
        ClaimVerdict::TakeOver => tracing::warn!(
            run_id,
            agent_id,
            previous = ?run.claimed_by,
            epoch = saved.lease_epoch,
            "Expired lease taken over"
        ),
        _ => tracing::debug!(run_id, agent_id, epoch = saved.lease_epoch, "Lease granted"),
    }

    Ok(ClaimOutcome {
        success: true,
        claimed_by: saved.claimed_by,
        expires_in: ttl_seconds,
        epoch: saved.lease_epoch,
    })
}

/// Refresh the heartbeat if `agent_id` holds the lease (and `token`, when
/// given, is current). Returns whether the heartbeat was accepted.
pub fn heartbeat_in(
    conn: &Connection,
    run_id: i64,
    agent_id: &str,
    token: Option<&LeaseToken>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let run = runs::require(conn, run_id)?;
    if !token_is_current(&run, agent_id, token) {
        tracing::warn!(run_id, agent_id, holder = ?run.claimed_by, "Heartbeat from non-holder rejected");
        return Ok(false);
    }

    let mut beat = run;
    beat.heartbeat_at = Some(now);
    runs::save(conn, &beat)?;
    Ok(true)
}
