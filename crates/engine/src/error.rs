use autopilot_core::collaborators::CollaboratorError;
use autopilot_core::error::CoreError;

/// Infrastructure failures inside the engine.
///
/// Skips and execution failures are not errors: they end up as Run rows.
/// An `EngineError` means the engine could not record an outcome at all.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Run queue is closed")]
    QueueClosed,
}

impl EngineError {
    /// Whether retrying the same operation may succeed: the store or a
    /// collaborator was unreachable rather than refusing the request.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Database(_) => true,
            EngineError::Collaborator(e) => !matches!(e, CollaboratorError::Rejected { .. }),
            EngineError::Core(_) | EngineError::QueueClosed => false,
        }
    }

    /// Whether the failure came from outside the engine (the store or a
    /// collaborator) rather than from its own configuration.
    pub fn is_upstream(&self) -> bool {
        matches!(self, EngineError::Database(_) | EngineError::Collaborator(_))
    }
}
