use std::sync::Arc;

use autopilot_core::collaborators::{
    ContentSource, ContentStore, Entitlements, Generator, SettingsSource,
};
use autopilot_core::rules::RuleCatalog;
use autopilot_events::EventBus;

use crate::config::EngineConfig;
use crate::store::{AuditWriter, RunStore};

/// Everything the gate, executor and background tasks share.
///
/// Cheap to clone; holds no per-Run state.
#[derive(Clone)]
pub struct EngineContext {
    pub rules: Arc<RuleCatalog>,
    pub store: Arc<dyn RunStore>,
    pub audit: Arc<dyn AuditWriter>,
    pub settings: Arc<dyn SettingsSource>,
    pub entitlements: Arc<dyn Entitlements>,
    pub content: Arc<dyn ContentSource>,
    pub generator: Arc<dyn Generator>,
    pub content_store: Arc<dyn ContentStore>,
    pub bus: Arc<EventBus>,
    pub config: EngineConfig,
}
