//! Automation rule catalog.
//!
//! Rules are immutable configuration loaded once at startup and shared by
//! every tenant. Per-tenant toggles live in `automation_settings`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::trigger::TriggerType;

/// Rule that generates FAQ answers when a catalog item is synced.
pub const RULE_SYNC_FAQ_ANSWERS: &str = "sync_faq_answers";

/// Rule that generates attribute fixes when a quality issue is detected.
pub const RULE_ISSUE_ATTRIBUTE_FIX: &str = "issue_attribute_fix";

/// Default successful runs per tenant, rule and UTC day.
pub const DEFAULT_DAILY_CAP: i64 = 500;

fn default_min_source_fields() -> usize {
    1
}

fn default_daily_cap() -> i64 {
    DEFAULT_DAILY_CAP
}

/// One automation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub rule_id: String,
    pub trigger_type: TriggerType,
    /// Content surface the rule writes to; recorded as the Run `action`.
    pub target_surface: String,
    #[serde(default)]
    pub enabled_by_default: bool,
    /// Fields whose content makes up the fingerprint. Empty means all.
    #[serde(default)]
    pub fingerprint_fields: Vec<String>,
    /// Fields the generator may draw on. Empty means all.
    #[serde(default)]
    pub source_fields: Vec<String>,
    #[serde(default = "default_min_source_fields")]
    pub min_source_fields: usize,
    /// Plan-independent ceiling; the entitlement service may lower it.
    #[serde(default = "default_daily_cap")]
    pub daily_cap: i64,
}

/// Validated, immutable set of rules.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<AutomationRule>,
}

impl RuleCatalog {
    /// Build a catalog, enforcing unique rule ids, one rule per trigger
    /// type, and non-negative caps.
    pub fn new(rules: Vec<AutomationRule>) -> Result<Self, CoreError> {
        let mut ids = HashSet::new();
        let mut triggers = HashSet::new();

        for rule in &rules {
            if rule.rule_id.trim().is_empty() {
                return Err(CoreError::Validation("Rule id must not be empty".into()));
            }
            if rule.target_surface.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Rule '{}' has an empty target_surface",
                    rule.rule_id
                )));
            }
            if rule.daily_cap < 0 {
                return Err(CoreError::Validation(format!(
                    "Rule '{}' has a negative daily_cap",
                    rule.rule_id
                )));
            }
            if !ids.insert(rule.rule_id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Duplicate rule id '{}'",
                    rule.rule_id
                )));
            }
            if !triggers.insert(rule.trigger_type) {
                return Err(CoreError::Validation(format!(
                    "More than one rule for trigger type '{}'",
                    rule.trigger_type
                )));
            }
        }

        Ok(Self { rules })
    }

    /// Parse a JSON array of rules.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let rules: Vec<AutomationRule> = serde_json::from_str(json)
            .map_err(|e| CoreError::Validation(format!("Invalid rule catalog: {e}")))?;
        Self::new(rules)
    }

    /// Built-in rules. Both are off until a tenant opts in.
    pub fn builtin() -> Self {
        let rules = vec![
            AutomationRule {
                rule_id: RULE_SYNC_FAQ_ANSWERS.into(),
                trigger_type: TriggerType::ContentSynced,
                target_surface: "product_faq".into(),
                enabled_by_default: false,
                fingerprint_fields: vec![
                    "title".into(),
                    "description".into(),
                    "attributes".into(),
                    "bullet_points".into(),
                ],
                source_fields: vec![
                    "title".into(),
                    "description".into(),
                    "attributes".into(),
                    "bullet_points".into(),
                ],
                min_source_fields: 2,
                daily_cap: DEFAULT_DAILY_CAP,
            },
            AutomationRule {
                rule_id: RULE_ISSUE_ATTRIBUTE_FIX.into(),
                trigger_type: TriggerType::IssueDetected,
                target_surface: "attribute_fix".into(),
                enabled_by_default: false,
                fingerprint_fields: vec!["title".into(), "attributes".into(), "issues".into()],
                source_fields: vec!["title".into(), "description".into(), "attributes".into()],
                min_source_fields: 1,
                daily_cap: DEFAULT_DAILY_CAP,
            },
        ];
        Self { rules }
    }

    pub fn rules(&self) -> &[AutomationRule] {
        &self.rules
    }

    pub fn get(&self, rule_id: &str) -> Option<&AutomationRule> {
        self.rules.iter().find(|r| r.rule_id == rule_id)
    }

    /// The rule that handles `trigger_type`, if any.
    pub fn for_trigger(&self, trigger_type: TriggerType) -> Option<&AutomationRule> {
        self.rules.iter().find(|r| r.trigger_type == trigger_type)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn builtin_catalog_passes_validation() {
        let builtin = RuleCatalog::builtin();
        let rebuilt = RuleCatalog::new(builtin.rules().to_vec());
        assert!(rebuilt.is_ok());
        assert!(builtin.rules().iter().all(|r| !r.enabled_by_default));
    }

    #[test]
    fn finds_rule_by_trigger() {
        let catalog = RuleCatalog::builtin();
        let rule = catalog.for_trigger(TriggerType::IssueDetected).unwrap();
        assert_eq!(rule.rule_id, RULE_ISSUE_ATTRIBUTE_FIX);
        assert!(catalog.get(RULE_SYNC_FAQ_ANSWERS).is_some());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn rejects_two_rules_for_one_trigger() {
        let json = r#"[
            {"rule_id": "a", "trigger_type": "content_synced", "target_surface": "faq"},
            {"rule_id": "b", "trigger_type": "content_synced", "target_surface": "faq"}
        ]"#;
        assert_matches!(RuleCatalog::from_json(json), Err(CoreError::Validation(_)));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = r#"[
            {"rule_id": "a", "trigger_type": "content_synced", "target_surface": "faq"},
            {"rule_id": "a", "trigger_type": "issue_detected", "target_surface": "fix"}
        ]"#;
        assert_matches!(RuleCatalog::from_json(json), Err(CoreError::Validation(msg)) if msg.contains("Duplicate"));
    }

    #[test]
    fn json_defaults_apply() {
        let json = r#"[{"rule_id": "a", "trigger_type": "issue_detected", "target_surface": "fix"}]"#;
        let catalog = RuleCatalog::from_json(json).unwrap();
        let rule = catalog.get("a").unwrap();
        assert!(!rule.enabled_by_default);
        assert_eq!(rule.min_source_fields, 1);
        assert_eq!(rule.daily_cap, DEFAULT_DAILY_CAP);
        assert!(rule.fingerprint_fields.is_empty());
    }

    #[test]
    fn rejects_malformed_json() {
        assert_matches!(RuleCatalog::from_json("{"), Err(CoreError::Validation(_)));
    }
}
