//! HTTP surface of the automation engine: trigger ingestion, the Run query
//! surface, tenant settings, usage and audit endpoints.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;
