//! In-memory registries owned by an [`crate::Orchestrator`].
//!
//! - [`WorkflowRegistry`] validates and stores workflow definitions.
//! - [`ServiceRegistry`] maps service ids to [`Service`] handlers and
//!   dispatches `(service, action)` calls.
//!
//! Both are written during setup and read concurrently by every run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use services::{ActionInput, Service};

use crate::{models::WorkflowDefinition, EngineError, TaskError};

// ---------------------------------------------------------------------------
// Workflow registry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<BTreeMap<String, Arc<WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store `definition`, replacing any workflow with the same id.
    ///
    /// Cycles are *not* detected here; they surface when the workflow is
    /// executed, or earlier if the caller runs
    /// [`crate::scheduler::build_batches`] itself.
    ///
    /// # Errors
    /// [`EngineError::Validation`] for a blank id or name, an empty task list,
    /// a duplicated task id, or a dependency on a task that does not exist.
    pub fn register(&self, definition: WorkflowDefinition) -> Result<Arc<WorkflowDefinition>, EngineError> {
        validate_definition(&definition)?;

        let definition = Arc::new(definition);
        let previous = self
            .workflows
            .write()
            .insert(definition.id.clone(), Arc::clone(&definition));

        if previous.is_some() {
            warn!(workflow_id = %definition.id, "workflow re-registered, previous definition replaced");
        } else {
            debug!(workflow_id = %definition.id, tasks = definition.tasks.len(), "workflow registered");
        }
        Ok(definition)
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.read().get(id).cloned()
    }

    /// All definitions, ordered by id.
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.workflows.read().values().cloned().collect()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}

fn validate_definition(definition: &WorkflowDefinition) -> Result<(), EngineError> {
    if definition.id.trim().is_empty() {
        return Err(EngineError::Validation("workflow id is required".into()));
    }
    if definition.name.trim().is_empty() {
        return Err(EngineError::Validation(format!(
            "workflow '{}' has no name",
            definition.id
        )));
    }
    if definition.tasks.is_empty() {
        return Err(EngineError::Validation(format!(
            "workflow '{}' has no tasks",
            definition.id
        )));
    }

    let mut task_ids: HashSet<&str> = HashSet::with_capacity(definition.tasks.len());
    for task in &definition.tasks {
        if !task_ids.insert(task.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "duplicate task id '{}'",
                task.id
            )));
        }
    }

    for task in &definition.tasks {
        for dependency in &task.dependencies {
            if !task_ids.contains(dependency.as_str()) {
                return Err(EngineError::Validation(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.id, dependency
                )));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Service registry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `id`, replacing any previous handler.
    pub fn register_service(&self, id: impl Into<String>, service: Arc<dyn Service>) {
        let id = id.into();
        debug!(service_id = %id, actions = ?service.actions(), "service registered");
        self.services.write().insert(id, service);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.services.read().contains_key(id)
    }

    /// Registered service ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.services.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Look up the handler that will run `action` on `service_id`.
    ///
    /// # Errors
    /// [`TaskError::ServiceNotFound`] or [`TaskError::ActionNotFound`].
    pub fn resolve(&self, service_id: &str, action: &str) -> Result<Arc<dyn Service>, TaskError> {
        let service = self
            .services
            .read()
            .get(service_id)
            .cloned()
            .ok_or_else(|| TaskError::ServiceNotFound(service_id.to_owned()))?;

        if !service.has_action(action) {
            return Err(TaskError::ActionNotFound {
                service: service_id.to_owned(),
                action: action.to_owned(),
            });
        }
        Ok(service)
    }

    /// Invoke `action` on `service_id`. The read lock is released before the
    /// action runs.
    pub async fn dispatch(&self, service_id: &str, action: &str, input: ActionInput) -> Result<Value, TaskError> {
        let service = self.resolve(service_id, action)?;
        Ok(service.call(action, input).await?)
    }
}
