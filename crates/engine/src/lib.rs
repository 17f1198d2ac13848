//! The automation engine: Evaluation Gate orchestration, dispatcher queue,
//! executor state machine, audit writer and background tasks.

use std::time::Duration;

use autopilot_core::types::Timestamp;
use chrono::{DateTime, Utc};

pub mod audit;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod gate;
pub mod ingest;
pub mod lifecycle;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod store;
pub mod sweep;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use error::EngineError;
pub use executor::{ExecutionOutcome, Executor};
pub use gate::{Evaluator, GateOutcome};

/// The instant `age` before now, saturating at the earliest representable
/// time.
pub(crate) fn cutoff(age: Duration) -> Timestamp {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
