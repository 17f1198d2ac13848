//! Entity content, fingerprinting and the data-sufficiency check.
//!
//! A fingerprint covers only the fields an automation kind cares about, so
//! edits to unrelated fields never re-trigger work.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hashing;
use crate::rules::AutomationRule;

/// Current content of a catalog entity as reported by the catalog
/// collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityContent {
    pub entity_id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl EntityContent {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter, mostly for tests and fixtures.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Context handed to the generation collaborator: only usable source
/// fields, never placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentContext {
    pub rule_id: String,
    pub target_surface: String,
    pub fingerprint_hash: String,
    pub fields: BTreeMap<String, Value>,
}

/// Whether a field value carries real source material.
pub fn is_usable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(is_usable),
        Value::Object(map) => map.values().any(is_usable),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Compute the deterministic fingerprint of the content relevant to `rule`.
///
/// Every listed field participates (absent fields as `null`) so adding or
/// removing a relevant field changes the hash. The rule id is mixed in so
/// two automation kinds never share a fingerprint by accident.
pub fn fingerprint(rule: &AutomationRule, content: &EntityContent) -> String {
    let subset: BTreeMap<&str, &Value> = if rule.fingerprint_fields.is_empty() {
        content
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    } else {
        rule.fingerprint_fields
            .iter()
            .map(|k| (k.as_str(), content.fields.get(k).unwrap_or(&Value::Null)))
            .collect()
    };

    // BTreeMap and serde_json's default Map both serialize keys in sorted
    // order, so the canonical form is stable across runs.
    let canonical = serde_json::to_string(&subset).unwrap_or_default();
    hashing::sha256_hex(format!("{}\n{canonical}", rule.rule_id).as_bytes())
}

/// Usable source fields for `rule`, in key order.
pub fn usable_source_fields(
    rule: &AutomationRule,
    content: &EntityContent,
) -> BTreeMap<String, Value> {
    content
        .fields
        .iter()
        .filter(|(k, _)| rule.source_fields.is_empty() || rule.source_fields.contains(k))
        .filter(|(_, v)| is_usable(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Cheap local check on whether there is enough source material to
/// plausibly generate content. Never calls out to a model.
pub fn has_sufficient_data(rule: &AutomationRule, content: &EntityContent) -> bool {
    usable_source_fields(rule, content).len() >= rule.min_source_fields.max(1)
}

/// Build the generation context for `rule` from current content.
pub fn build_context(
    rule: &AutomationRule,
    content: &EntityContent,
    fingerprint_hash: &str,
) -> ContentContext {
    ContentContext {
        rule_id: rule.rule_id.clone(),
        target_surface: rule.target_surface.clone(),
        fingerprint_hash: fingerprint_hash.to_string(),
        fields: usable_source_fields(rule, content),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
