//! HTTP clients for the services the automation engine consumes.
//!
//! Each client implements one collaborator trait from
//! `autopilot_core::collaborators` and holds nothing between calls beyond
//! a pooled [`reqwest::Client`].

pub mod catalog;
pub mod client;
pub mod config;
pub mod content_store;
pub mod entitlements;
pub mod generation;

pub use catalog::HttpCatalog;
pub use config::ConnectorsConfig;
pub use content_store::HttpContentStore;
pub use entitlements::HttpEntitlements;
pub use generation::HttpGenerator;
