//! Skip-reason and failure taxonomy recorded on every Run.
//!
//! Skips are normal outcomes, not errors. Failures carry an error code plus
//! a free-form detail and are the only outcomes eligible for alerting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// SkipReason
// ---------------------------------------------------------------------------

/// Why a Run did not produce content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    // Gate-time
    SettingDisabled,
    EntitlementNotAllowed,
    DailyCapReached,
    IdempotentAlreadyDone,
    InsufficientData,
    AlreadyInFlight,
    // Execution-time
    StaleFingerprint,
    CannotGenerateSafely,
}

impl SkipReason {
    pub const ALL: [SkipReason; 8] = [
        SkipReason::SettingDisabled,
        SkipReason::EntitlementNotAllowed,
        SkipReason::DailyCapReached,
        SkipReason::IdempotentAlreadyDone,
        SkipReason::InsufficientData,
        SkipReason::AlreadyInFlight,
        SkipReason::StaleFingerprint,
        SkipReason::CannotGenerateSafely,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::SettingDisabled => "setting_disabled",
            SkipReason::EntitlementNotAllowed => "entitlement_not_allowed",
            SkipReason::DailyCapReached => "daily_cap_reached",
            SkipReason::IdempotentAlreadyDone => "idempotent_already_done",
            SkipReason::InsufficientData => "insufficient_data",
            SkipReason::AlreadyInFlight => "already_in_flight",
            SkipReason::StaleFingerprint => "stale_fingerprint",
            SkipReason::CannotGenerateSafely => "cannot_generate_safely",
        }
    }

    /// Whether the Evaluation Gate produces this reason (as opposed to the
    /// Executor).
    pub fn is_gate_time(self) -> bool {
        !matches!(
            self,
            SkipReason::StaleFingerprint | SkipReason::CannotGenerateSafely
        )
    }

    /// Whether a skip with this reason is a verdict on the entity content
    /// itself, so repeating it for the same fingerprint is redundant work.
    ///
    /// Skips caused by tenant state (settings, entitlements, caps) or by
    /// timing (in-flight, stale) say nothing about the content and must not
    /// block a later run once that condition changes.
    pub fn settles_fingerprint(self) -> bool {
        matches!(
            self,
            SkipReason::InsufficientData | SkipReason::CannotGenerateSafely
        )
    }

    /// String forms of every reason for which [`settles_fingerprint`] holds.
    ///
    /// [`settles_fingerprint`]: SkipReason::settles_fingerprint
    pub fn settling_reasons() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|r| r.settles_fingerprint())
            .map(|r| r.as_str())
            .collect()
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkipReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown skip reason '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

/// Failure classes. All are retryable through re-arm on the next trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient generation failures persisted through every attempt.
    GenerationTransientError,
    /// The generation collaborator rejected the request outright.
    GenerationError,
    /// Current entity content could not be fetched.
    ContentUnavailable,
    PersistenceFailure,
    /// Swept after exceeding the operational timeout.
    Timeout,
    /// The gate could not gather its facts for a bus trigger, even after
    /// retrying.
    GateUnavailable,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::GenerationTransientError,
        FailureKind::GenerationError,
        FailureKind::ContentUnavailable,
        FailureKind::PersistenceFailure,
        FailureKind::Timeout,
        FailureKind::GateUnavailable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::GenerationTransientError => "generation_transient_error",
            FailureKind::GenerationError => "generation_error",
            FailureKind::ContentUnavailable => "content_unavailable",
            FailureKind::PersistenceFailure => "persistence_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::GateUnavailable => "gate_unavailable",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown failure kind '{s}'")))
    }
}
