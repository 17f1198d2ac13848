//! Event names published on the bus for Run lifecycle transitions.

/// A Run was admitted by the gate and queued.
pub const RUN_QUEUED: &str = "automation.run_queued";

/// A Run finished with generated content persisted.
pub const RUN_SUCCEEDED: &str = "automation.run_succeeded";

/// A Run was skipped, at the gate or during execution.
pub const RUN_SKIPPED: &str = "automation.run_skipped";

/// A Run failed during execution and will re-arm on the next trigger.
pub const RUN_FAILED: &str = "automation.run_failed";
