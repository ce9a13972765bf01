//! `ActionTable` — build a [`Service`] out of async closures.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ActionInput, Service, ServiceError};

type ActionFuture = Pin<Box<dyn Future<Output = Result<Value, ServiceError>> + Send>>;
type ActionFn = Arc<dyn Fn(ActionInput) -> ActionFuture + Send + Sync>;

/// A service whose actions are registered one closure at a time.
///
/// ```ignore
/// let crawler = ActionTable::new()
///     .with_action("crawl", |input| async move { Ok(json!({ "pages": 3, "seed": input["url"] })) });
/// ```
#[derive(Clone, Default)]
pub struct ActionTable {
    actions: BTreeMap<String, ActionFn>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, replacing any action already registered under it.
    pub fn with_action<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(ActionInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
    {
        let action: ActionFn = Arc::new(move |input| Box::pin(action(input)));
        self.actions.insert(name.into(), action);
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTable")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl Service for ActionTable {
    fn actions(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    async fn call(&self, action: &str, input: ActionInput) -> Result<Value, ServiceError> {
        let handler = self
            .actions
            .get(action)
            .ok_or_else(|| ServiceError::UnsupportedAction(action.to_owned()))?;
        handler(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> ActionTable {
        ActionTable::new()
            .with_action("double", |input| async move {
                match input.get("n").and_then(Value::as_i64) {
                    Some(n) => Ok(json!(n * 2)),
                    None => Err(ServiceError::InvalidInput("missing 'n'".into())),
                }
            })
            .with_action("noop", |_| async { Ok(Value::Null) })
    }

    #[tokio::test]
    async fn registered_action_is_invoked() {
        let mut input = ActionInput::new();
        input.insert("n".into(), json!(21));
        assert_eq!(table().call("double", input).await, Ok(json!(42)));
    }

    #[tokio::test]
    async fn action_errors_are_returned_verbatim() {
        let err = table().call("double", ActionInput::new()).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidInput("missing 'n'".into()));
    }

    #[tokio::test]
    async fn unknown_action_is_unsupported() {
        let err = table().call("triple", ActionInput::new()).await.unwrap_err();
        assert_eq!(err, ServiceError::UnsupportedAction("triple".into()));
    }

    #[test]
    fn actions_are_listed_in_name_order() {
        let t = table();
        assert_eq!(t.actions(), vec!["double", "noop"]);
        assert!(t.has_action("noop"));
        assert!(!t.has_action("Noop"));
        assert_eq!(t.len(), 2);
    }
}
