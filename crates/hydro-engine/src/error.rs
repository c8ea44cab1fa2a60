//! Engine errors

use hydro_triggers::TriggerError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the poller, dispatcher and controller
#[derive(Debug, Error)]
pub enum EngineError {
    /// A trigger was registered while already in the live set
    #[error("trigger {id} ({description}) added to the trigger set more than once")]
    DuplicateTrigger { id: String, description: String },

    /// A removal was requested for a trigger not in the live set
    #[error("tried to remove trigger {id} ({description}) which is not in the trigger set")]
    UnknownTrigger { id: String, description: String },

    /// The dispatcher side of the execution queue is gone
    #[error("execution queue is closed")]
    QueueClosed,

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    WorkerPanicked(String),

    #[error("controller {0} is already running")]
    AlreadyRunning(String),

    #[error("controller {0} is not running")]
    NotRunning(String),

    /// A handle outlived the controller it points to
    #[error("controller {0} has been dropped")]
    ControllerDropped(String),

    #[error("group {0} is already registered")]
    DuplicateGroup(String),

    #[error("group {0} is not bound to a controller")]
    GroupNotBound(String),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),
}

impl EngineError {
    /// Whether this error means the trigger set invariants were broken by a caller
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            EngineError::DuplicateTrigger { .. } | EngineError::UnknownTrigger { .. }
        )
    }
}
