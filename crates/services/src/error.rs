//! Service-level error type.

use thiserror::Error;

/// Errors returned by a service action.
///
/// The engine treats every variant as a task execution failure; whether the
/// task is retried is decided by the task's retry policy, not by the variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The action ran and reported a failure.
    #[error("action failed: {0}")]
    Failed(String),

    /// The action rejected its input before doing any work.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The service was asked to run an action it does not expose.
    #[error("unsupported action '{0}'")]
    UnsupportedAction(String),
}
