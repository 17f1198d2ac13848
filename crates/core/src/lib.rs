//! Domain model and pure decision logic for the automation engine.
//!
//! This crate has no internal dependencies so it can be shared by the
//! repository layer, the engine, the HTTP connectors and both binaries.

pub mod audit;
pub mod collaborators;
pub mod content;
pub mod error;
pub mod gate;
pub mod generation;
pub mod hashing;
pub mod reasons;
pub mod rules;
pub mod run_events;
pub mod trigger;
pub mod types;
