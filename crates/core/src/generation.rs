//! Generation collaborator contract types and the no-fabrication filter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::is_usable;

/// One generated data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedItem {
    pub key: String,
    /// `None` when the generator could not produce a confident answer.
    pub value: Option<Value>,
    pub confidence: f64,
    #[serde(default)]
    pub source_fields_used: Vec<String>,
}

/// Successful response from `generate(entityId, contentContext)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationResponse {
    Items { items: Vec<GeneratedItem> },
    InsufficientData,
}

/// Failure of a single generation attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation rate limited: {0}")]
    RateLimited(String),

    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Generation service unavailable: {0}")]
    Unavailable(String),

    #[error("Generation rejected: {0}")]
    Rejected(String),
}

impl GenerationError {
    /// Transient failures are eligible for the bounded retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GenerationError::Rejected(_))
    }
}

/// Drop every item that is not a confident, grounded answer.
///
/// An item survives only if it has a usable value, its confidence reaches
/// `min_confidence`, and it names at least one source field. Nothing is
/// ever filled in for dropped items.
pub fn retain_confident(items: Vec<GeneratedItem>, min_confidence: f64) -> Vec<GeneratedItem> {
    items
        .into_iter()
        .filter(|item| {
            let grounded = item.source_fields_used.iter().any(|f| !f.trim().is_empty());
            let has_value = item.value.as_ref().is_some_and(is_usable);
            let confident = item.confidence.is_finite() && item.confidence >= min_confidence;
            !item.key.trim().is_empty() && grounded && has_value && confident
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(key: &str, value: Option<Value>, confidence: f64, sources: &[&str]) -> GeneratedItem {
        GeneratedItem {
            key: key.into(),
            value,
            confidence,
            source_fields_used: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn keeps_confident_grounded_items() {
        let kept = retain_confident(
            vec![item("q1", Some(json!("Yes, waterproof")), 0.9, &["description"])],
            0.6,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn drops_low_confidence_and_missing_values() {
        let kept = retain_confident(
            vec![
                item("low", Some(json!("maybe")), 0.3, &["title"]),
                item("none", None, 0.99, &["title"]),
                item("blank", Some(json!("  ")), 0.99, &["title"]),
                item("nan", Some(json!("x")), f64::NAN, &["title"]),
                item("ok", Some(json!("answer")), 0.6, &["title"]),
            ],
            0.6,
        );
        let keys: Vec<_> = kept.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["ok"]);
    }

    #[test]
    fn drops_ungrounded_items() {
        let kept = retain_confident(vec![item("q", Some(json!("a")), 0.95, &[])], 0.5);
        assert!(kept.is_empty());
    }

    #[test]
    fn transient_classification() {
        assert!(GenerationError::RateLimited("429".into()).is_transient());
        assert!(GenerationError::Timeout(30).is_transient());
        assert!(GenerationError::Unavailable("503".into()).is_transient());
        assert!(!GenerationError::Rejected("400".into()).is_transient());
    }

    #[test]
    fn response_wire_format() {
        let parsed: GenerationResponse =
            serde_json::from_value(json!({ "outcome": "insufficient_data" })).unwrap();
        assert_eq!(parsed, GenerationResponse::InsufficientData);

        let parsed: GenerationResponse = serde_json::from_value(json!({
            "outcome": "items",
            "items": [{ "key": "k", "value": "v", "confidence": 0.8, "source_fields_used": ["title"] }]
        }))
        .unwrap();
        assert!(matches!(parsed, GenerationResponse::Items { items } if items.len() == 1));
    }
}
