//! Process wiring for the automation engine.
//!
//! The `autopilot-worker` binary runs executors only. The API binary reuses
//! the same wiring to host embedded workers alongside the HTTP server.

pub mod bootstrap;
pub mod telemetry;
