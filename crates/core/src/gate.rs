//! Evaluation Gate decision logic.
//!
//! Each check is a pure function over facts the caller has gathered. The
//! engine runs them in order and stops gathering facts at the first skip,
//! so a disabled setting never costs an entitlement lookup. [`evaluate`]
//! composes the same checks over a complete fact set.

use serde::{Deserialize, Serialize};

use crate::reasons::SkipReason;
use crate::types::DbId;

/// Outcome of the Evaluation Gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Proceed { rule_id: String },
    Skip { reason: SkipReason },
}

impl Decision {
    pub fn skip(reason: SkipReason) -> Self {
        Decision::Skip { reason }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Decision::Skip { reason } => Some(*reason),
            Decision::Proceed { .. } => None,
        }
    }
}

/// Terminal outcome of an earlier Run, as seen by the idempotency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorOutcome {
    Succeeded,
    Skipped(SkipReason),
    Failed,
}

/// The most recent Run for a key that settled its fingerprint: a success,
/// a failure, or a content-verdict skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorRun {
    pub run_id: DbId,
    pub outcome: PriorOutcome,
    pub fingerprint_hash: Option<String>,
}

/// Everything the gate needs to decide.
#[derive(Debug, Clone)]
pub struct GateFacts<'a> {
    pub setting_enabled: bool,
    pub entitled: bool,
    pub succeeded_today: i64,
    pub daily_cap: i64,
    pub fingerprint_hash: &'a str,
    pub latest_settled: Option<&'a PriorRun>,
    pub sufficient_data: bool,
}

pub fn check_setting(enabled: bool) -> Result<(), SkipReason> {
    if enabled {
        Ok(())
    } else {
        Err(SkipReason::SettingDisabled)
    }
}

pub fn check_entitlement(allowed: bool) -> Result<(), SkipReason> {
    if allowed {
        Ok(())
    } else {
        Err(SkipReason::EntitlementNotAllowed)
    }
}

/// Skip when today's successful runs are at or over the cap.
pub fn check_daily_cap(succeeded_today: i64, cap: i64) -> Result<(), SkipReason> {
    if succeeded_today >= cap {
        Err(SkipReason::DailyCapReached)
    } else {
        Ok(())
    }
}

/// Skip when the latest settled Run already handled this exact content.
///
/// A `FAILED` prior never blocks: that is the re-arm path.
pub fn check_idempotency(
    fingerprint_hash: &str,
    latest_settled: Option<&PriorRun>,
) -> Result<(), SkipReason> {
    let Some(prior) = latest_settled else {
        return Ok(());
    };
    let same_content = prior.fingerprint_hash.as_deref() == Some(fingerprint_hash);
    let settled = match prior.outcome {
        PriorOutcome::Succeeded => true,
        PriorOutcome::Skipped(reason) => reason.settles_fingerprint(),
        PriorOutcome::Failed => false,
    };
    if same_content && settled {
        Err(SkipReason::IdempotentAlreadyDone)
    } else {
        Ok(())
    }
}

pub fn check_sufficiency(sufficient: bool) -> Result<(), SkipReason> {
    if sufficient {
        Ok(())
    } else {
        Err(SkipReason::InsufficientData)
    }
}

/// The failed Run a new Run would supersede, if the key is being re-armed.
pub fn rearm_source(latest_settled: Option<&PriorRun>) -> Option<DbId> {
    latest_settled
        .filter(|prior| prior.outcome == PriorOutcome::Failed)
        .map(|prior| prior.run_id)
}

/// Run every check in order; the first failing check wins.
pub fn evaluate(facts: &GateFacts<'_>) -> Result<(), SkipReason> {
    check_setting(facts.setting_enabled)?;
    check_entitlement(facts.entitled)?;
    check_daily_cap(facts.succeeded_today, facts.daily_cap)?;
    check_idempotency(facts.fingerprint_hash, facts.latest_settled)?;
    check_sufficiency(facts.sufficient_data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
