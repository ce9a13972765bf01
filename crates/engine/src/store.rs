//! Execution records storage.
//!
//! The orchestrator saves every finished [`Execution`] through an
//! [`ExecutionStore`]. [`MemoryExecutionStore`] is the default; an embedding
//! application plugs in a durable store by implementing the trait.
//! Records are only written once a run has finished, so nothing here
//! supports resuming an interrupted run. A failed save is logged by the
//! orchestrator and does not change the outcome of the run.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::Execution;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or replace the record with `execution.id`.
    async fn save(&self, execution: &Execution) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Execution>, StoreError>;

    /// Executions of one workflow, oldest first.
    async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<Execution>, StoreError>;
}

/// In-memory store, suitable for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, Execution>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.read().is_empty()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn save(&self, execution: &Execution) -> Result<(), StoreError> {
        self.executions.write().insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Execution>, StoreError> {
        Ok(self.executions.read().get(&id).cloned())
    }

    async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<Execution>, StoreError> {
        let mut matching: Vec<Execution> = self
            .executions
            .read()
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.started_at);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionStatus;

    #[tokio::test]
    async fn save_replaces_by_id() {
        let store = MemoryExecutionStore::new();
        let mut exec = Execution::new("wf");
        store.save(&exec).await.unwrap();

        exec.status = ExecutionStatus::Completed;
        store.save(&exec).await.unwrap();

        assert_eq!(store.len(), 1);
        let saved = store.get(exec.id).await.unwrap().expect("record exists");
        assert_eq!(saved.status, ExecutionStatus::Completed);
        assert_eq!(store.get(Uuid::new_v4()).await, Ok(None));
    }

    #[tokio::test]
    async fn list_filters_by_workflow() {
        let store = MemoryExecutionStore::new();
        let first = Execution::new("wf");
        let other = Execution::new("other");
        let second = Execution::new("wf");
        for e in [&first, &other, &second] {
            store.save(e).await.unwrap();
        }

        let listed = store.list_for_workflow("wf").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| e.workflow_id == "wf"));
        assert!(listed[0].started_at <= listed[1].started_at);
        assert!(store.list_for_workflow("none").await.unwrap().is_empty());
    }
}
