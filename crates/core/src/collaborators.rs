//! Narrow interfaces to the external services the engine consumes.
//!
//! Implementations live in `autopilot-connectors` (HTTP) and in the
//! engine's in-memory test doubles. None of them may cache state across
//! Runs.

use async_trait::async_trait;
use serde_json::Value;

use crate::content::{ContentContext, EntityContent};
use crate::generation::{GenerationError, GeneratedItem, GenerationResponse};

/// Failure talking to a collaborator other than the generator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
}

/// A tenant's plan entitlement for one automation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlement {
    /// Is this automation kind allowed for the tenant today?
    pub allowed: bool,
    /// Plan-specific daily cap, or `None` to use the rule's own cap.
    pub daily_cap: Option<i64>,
}

/// Plan/entitlement service.
#[async_trait]
pub trait Entitlements: Send + Sync {
    /// Look up the tenant's entitlement for `rule_id`. Called at most once
    /// per evaluation.
    async fn entitlement(
        &self,
        tenant_id: &str,
        rule_id: &str,
    ) -> Result<Entitlement, CollaboratorError>;
}

/// Per-tenant automation toggles, read-only from the engine's view.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn is_enabled(&self, tenant_id: &str, rule_id: &str) -> Result<bool, CollaboratorError>;
}

/// Catalog content lookup.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Current content of an entity, or `None` if it no longer exists.
    async fn fetch(
        &self,
        tenant_id: &str,
        entity_id: &str,
    ) -> Result<Option<EntityContent>, CollaboratorError>;
}

/// Content-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        entity_id: &str,
        context: &ContentContext,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// Persistence for generated content. The engine writes through it but
/// does not own its schema.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Current generated content on `surface`, used as the before snapshot.
    async fn snapshot(
        &self,
        tenant_id: &str,
        entity_id: &str,
        surface: &str,
    ) -> Result<Option<Value>, CollaboratorError>;

    /// Write all items or none.
    async fn write_generated_content(
        &self,
        tenant_id: &str,
        entity_id: &str,
        surface: &str,
        items: &[GeneratedItem],
    ) -> Result<(), CollaboratorError>;
}
