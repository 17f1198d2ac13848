//! In-process event bus for catalog signals and automation run lifecycle
//! events.

pub mod bus;

pub use bus::{DomainEvent, EventBus};
