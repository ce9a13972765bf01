//! Built-in services available to every orchestrator binary.
//!
//! - `echo`: `echo` returns its input, `merge` flattens object-valued inputs
//!   into one object.
//! - `delay`: `sleep` waits `ms` milliseconds then reports how long it slept.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{ActionInput, ActionTable, ServiceError};

/// The `echo` service.
pub fn echo() -> ActionTable {
    ActionTable::new()
        .with_action("echo", |input| async move { Ok(Value::Object(input)) })
        .with_action("merge", |input| async move { merge(input) })
}

/// The `delay` service.
pub fn delay() -> ActionTable {
    ActionTable::new().with_action("sleep", |input| async move {
        let ms = match input.get("ms").and_then(Value::as_u64) {
            Some(ms) => ms,
            None => return Err(ServiceError::InvalidInput("'ms' must be a non-negative integer".into())),
        };
        debug!(ms, "delay.sleep");
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "sleptMs": ms }))
    })
}

fn merge(input: ActionInput) -> Result<Value, ServiceError> {
    let mut merged = Map::new();
    for (key, value) in input {
        match value {
            Value::Object(fields) => merged.extend(fields),
            Value::Null => {}
            other => {
                return Err(ServiceError::InvalidInput(format!(
                    "'{key}' is {other}, expected an object"
                )))
            }
        }
    }
    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Service;

    fn input(value: Value) -> ActionInput {
        match value {
            Value::Object(map) => map,
            _ => panic!("test input must be an object"),
        }
    }

    #[tokio::test]
    async fn merge_combines_object_inputs() {
        let out = echo()
            .call("merge", input(json!({ "a": { "x": 1 }, "b": { "y": 2 }, "c": null })))
            .await
            .unwrap();
        assert_eq!(out, json!({ "x": 1, "y": 2 }));
    }

    #[tokio::test]
    async fn merge_rejects_scalars() {
        let err = echo().call("merge", input(json!({ "a": 3 }))).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_reports_duration() {
        let out = delay().call("sleep", input(json!({ "ms": 250 }))).await.unwrap();
        assert_eq!(out, json!({ "sleptMs": 250 }));
    }

    #[tokio::test]
    async fn sleep_requires_ms() {
        let err = delay().call("sleep", ActionInput::new()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
