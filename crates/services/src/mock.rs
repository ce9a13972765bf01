//! `MockService` — a test double for `Service`.
//!
//! Useful in unit and integration tests where a real service implementation
//! is either unavailable or irrelevant.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{ActionInput, Service, ServiceError};

/// Behaviour injected into `MockService` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Return the action input as a JSON object.
    EchoInput,
    /// Always fail with the given message.
    Fail(String),
    /// Fail the first `failures` calls, then return `value`.
    FailThenReturn { failures: usize, value: Value },
    /// Sleep for `delay` before returning `value`.
    Sleep { delay: Duration, value: Value },
}

/// A mock service exposing a single action that records every call it
/// receives and returns a programmer-specified result.
pub struct MockService {
    /// Name of the one action this service answers to.
    pub action: String,
    /// What the action does when called.
    pub behaviour: MockBehaviour,
    /// All inputs seen by the action (in call order).
    pub calls: Arc<Mutex<Vec<ActionInput>>>,
}

impl MockService {
    fn with_behaviour(action: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            action: action.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that always succeeds with the given value.
    pub fn returning(action: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(action, MockBehaviour::ReturnValue(value))
    }

    /// A mock that returns its input.
    pub fn echoing(action: impl Into<String>) -> Self {
        Self::with_behaviour(action, MockBehaviour::EchoInput)
    }

    /// A mock that always fails.
    pub fn failing(action: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(action, MockBehaviour::Fail(msg.into()))
    }

    /// A mock that fails `failures` times before succeeding with `value`.
    pub fn flaky(action: impl Into<String>, failures: usize, value: Value) -> Self {
        Self::with_behaviour(action, MockBehaviour::FailThenReturn { failures, value })
    }

    /// A mock that takes `delay` to produce `value`.
    pub fn sleeping(action: impl Into<String>, delay: Duration, value: Value) -> Self {
        Self::with_behaviour(action, MockBehaviour::Sleep { delay, value })
    }

    /// Number of times the action has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Input of the most recent call, if any.
    pub fn last_input(&self) -> Option<ActionInput> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl Service for MockService {
    fn actions(&self) -> Vec<String> {
        vec![self.action.clone()]
    }

    async fn call(&self, action: &str, input: ActionInput) -> Result<Value, ServiceError> {
        if action != self.action {
            return Err(ServiceError::UnsupportedAction(action.to_owned()));
        }

        // Index of this call, zero-based.
        let attempt = {
            let mut calls = self.calls.lock();
            calls.push(input.clone());
            calls.len() - 1
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::EchoInput => Ok(Value::Object(input)),
            MockBehaviour::Fail(msg) => Err(ServiceError::Failed(msg.clone())),
            MockBehaviour::FailThenReturn { failures, value } => {
                if attempt < *failures {
                    Err(ServiceError::Failed(format!("scripted failure #{}", attempt + 1)))
                } else {
                    Ok(value.clone())
                }
            }
            MockBehaviour::Sleep { delay, value } => {
                tokio::time::sleep(*delay).await;
                Ok(value.clone())
            }
        }
    }
}
