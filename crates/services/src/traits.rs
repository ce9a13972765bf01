//! The `Service` trait — the contract every task target must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::ServiceError;

/// Resolved task input handed to an action.
pub type ActionInput = Map<String, Value>;

/// A named collection of asynchronous actions.
///
/// Actions are side-effect-bearing; the engine stores whatever JSON value an
/// action returns verbatim as the task result.
#[async_trait]
pub trait Service: Send + Sync {
    /// Names of the actions this service exposes.
    fn actions(&self) -> Vec<String>;

    /// Whether `action` is one of [`Service::actions`].
    fn has_action(&self, action: &str) -> bool {
        self.actions().iter().any(|a| a == action)
    }

    /// Run `action` with the resolved task input.
    async fn call(&self, action: &str, input: ActionInput) -> Result<Value, ServiceError>;
}
