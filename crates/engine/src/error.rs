//! Engine-level error types.

use std::time::Duration;

use thiserror::Error;

use services::ServiceError;

/// Errors returned to the caller of an orchestrator operation.
///
/// Task failures never appear here: they are captured into the returned
/// [`crate::Execution`] instead.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Registration errors ------

    /// The workflow definition is malformed.
    #[error("invalid workflow definition: {0}")]
    Validation(String),

    // ------ Scheduling errors ------

    /// No task is ready while tasks remain, so the graph contains a cycle.
    #[error("circular dependency among tasks: {}", remaining.join(", "))]
    CircularDependency {
        /// Tasks that could not be scheduled, in definition order.
        remaining: Vec<String>,
    },

    // ------ Lookup errors ------

    #[error("workflow '{0}' is not registered")]
    WorkflowNotFound(String),

    #[error("data stream '{0}' does not exist")]
    StreamNotFound(String),

    // ------ Persistence errors ------

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by an [`crate::store::ExecutionStore`] backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation.
    #[error("execution store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be encoded or decoded.
    #[error("execution record is corrupt: {0}")]
    Corrupt(String),
}

/// Why a single task did not produce a result.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    /// The task names a service nobody registered.
    #[error("service '{0}' is not registered")]
    ServiceNotFound(String),

    /// The service exists but does not expose the action.
    #[error("service '{service}' has no action '{action}'")]
    ActionNotFound { service: String, action: String },

    /// The action did not settle within the task timeout.
    #[error("timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    /// The action returned an error.
    #[error(transparent)]
    Execution(#[from] ServiceError),

    /// Every allowed attempt failed; wraps the last failure.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<TaskError> },
}

impl TaskError {
    /// Lookup failures are deterministic, retrying them cannot help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Execution(_))
    }
}
