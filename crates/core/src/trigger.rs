//! Trigger Adapter: normalizes heterogeneous domain events into a single
//! [`TriggerEvent`] shape.
//!
//! Normalization is side-effect free and performs no deduplication. Two
//! distinct raw events can legitimately map to the same logical trigger;
//! the Evaluation Gate decides whether the second one is redundant.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Source event names
// ---------------------------------------------------------------------------

/// Event emitted by the catalog sync service after an item was synced.
pub const EVENT_CATALOG_ITEM_SYNCED: &str = "catalog.item_synced";

/// Event emitted by the issue-detection service.
pub const EVENT_QUALITY_ISSUE_DETECTED: &str = "quality.issue_detected";

/// Maximum accepted length for tenant and entity identifiers.
pub const MAX_ID_LEN: usize = 255;

// ---------------------------------------------------------------------------
// TriggerType
// ---------------------------------------------------------------------------

/// The kind of domain change that may warrant automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    ContentSynced,
    IssueDetected,
}

impl TriggerType {
    pub const ALL: [TriggerType; 2] = [TriggerType::ContentSynced, TriggerType::IssueDetected];

    /// Stable string form stored in the `trigger_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::ContentSynced => "content_synced",
            TriggerType::IssueDetected => "issue_detected",
        }
    }

    /// Map an upstream event name to the trigger it represents.
    pub fn from_source_event(event_type: &str) -> Option<Self> {
        match event_type {
            EVENT_CATALOG_ITEM_SYNCED => Some(TriggerType::ContentSynced),
            EVENT_QUALITY_ISSUE_DETECTED => Some(TriggerType::IssueDetected),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content_synced" => Ok(TriggerType::ContentSynced),
            "issue_detected" => Ok(TriggerType::IssueDetected),
            other => Err(CoreError::Validation(format!(
                "Unknown trigger type '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw and normalized events
// ---------------------------------------------------------------------------

/// An un-validated trigger as received from the ingestion endpoint or an
/// upstream event payload. Accepts both snake_case and camelCase keys.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTriggerEvent {
    #[serde(default, alias = "entityId")]
    pub entity_id: Option<String>,
    #[serde(default, alias = "tenantId")]
    pub tenant_id: Option<String>,
    #[serde(default, alias = "triggerType")]
    pub trigger_type: Option<String>,
    #[serde(default, alias = "payloadDigest")]
    pub payload_digest: Option<String>,
    #[serde(default, alias = "occurredAt")]
    pub occurred_at: Option<Timestamp>,
}

/// A normalized trigger. Ephemeral: only referenced from Run records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub entity_id: String,
    pub trigger_type: TriggerType,
    pub tenant_id: String,
    pub occurred_at: Timestamp,
    pub payload_digest: Option<String>,
}

/// Normalize a raw event into a [`TriggerEvent`].
///
/// Rejects events missing `entity_id`, `tenant_id` or a known
/// `trigger_type`. A missing `occurred_at` defaults to the time of
/// normalization.
pub fn normalize(raw: &RawTriggerEvent) -> Result<TriggerEvent, CoreError> {
    let entity_id = required_id(raw.entity_id.as_deref(), "entity_id")?;
    let tenant_id = required_id(raw.tenant_id.as_deref(), "tenant_id")?;

    let trigger_type = match raw.trigger_type.as_deref().map(str::trim) {
        None | Some("") => {
            return Err(CoreError::MalformedEvent("missing trigger_type".into()));
        }
        Some(name) => name
            .parse::<TriggerType>()
            .or_else(|_| TriggerType::from_source_event(name).ok_or(()))
            .map_err(|_| CoreError::MalformedEvent(format!("unknown trigger_type '{name}'")))?,
    };

    let payload_digest = raw
        .payload_digest
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Ok(TriggerEvent {
        entity_id,
        trigger_type,
        tenant_id,
        occurred_at: raw.occurred_at.unwrap_or_else(Utc::now),
        payload_digest,
    })
}

/// Normalize an upstream domain event (`catalog.item_synced`,
/// `quality.issue_detected`) whose payload carries the entity and tenant.
pub fn normalize_source_event(
    event_type: &str,
    payload: &serde_json::Value,
    occurred_at: Timestamp,
) -> Result<TriggerEvent, CoreError> {
    let trigger_type = TriggerType::from_source_event(event_type).ok_or_else(|| {
        CoreError::MalformedEvent(format!("event '{event_type}' is not a trigger source"))
    })?;

    let field = |snake: &str, camel: &str| {
        payload
            .get(snake)
            .or_else(|| payload.get(camel))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    };

    let raw = RawTriggerEvent {
        entity_id: field("entity_id", "entityId"),
        tenant_id: field("tenant_id", "tenantId"),
        trigger_type: Some(trigger_type.as_str().to_string()),
        payload_digest: field("payload_digest", "payloadDigest"),
        occurred_at: Some(occurred_at),
    };
    normalize(&raw)
}

fn required_id(value: Option<&str>, field: &str) -> Result<String, CoreError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(CoreError::MalformedEvent(format!("missing {field}")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(CoreError::MalformedEvent(format!(
            "{field} exceeds {MAX_ID_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
