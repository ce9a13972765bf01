//! `Orchestrator` — the entry point embedding applications hold on to.
//!
//! An orchestrator owns its registries, event bus, data streams and
//! execution store; nothing is shared between instances. It is `Send + Sync`
//! and meant to be wrapped in an `Arc` when runs are driven from several
//! tasks at once.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument};
use uuid::Uuid;

use services::Service;

use crate::events::{EventBus, WorkflowEvent};
use crate::executor::{ExecutorConfig, WorkflowExecutor};
use crate::models::{Execution, WorkflowDefinition};
use crate::registry::{ServiceRegistry, WorkflowRegistry};
use crate::store::{ExecutionStore, MemoryExecutionStore};
use crate::streams::StreamBus;
use crate::EngineError;

pub struct Orchestrator {
    workflows: WorkflowRegistry,
    services: Arc<ServiceRegistry>,
    events: EventBus,
    streams: StreamBus,
    executions: Arc<dyn ExecutionStore>,
    config: ExecutorConfig,
}

impl Orchestrator {
    /// An orchestrator backed by an in-memory execution store.
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryExecutionStore::new()))
    }

    pub fn with_store(config: ExecutorConfig, executions: Arc<dyn ExecutionStore>) -> Self {
        Self {
            workflows: WorkflowRegistry::new(),
            services: Arc::new(ServiceRegistry::new()),
            events: EventBus::new(),
            streams: StreamBus::new(),
            executions,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Validate and store a workflow definition, replacing any workflow with
    /// the same id. Emits `workflow:registered`.
    ///
    /// # Errors
    /// [`EngineError::Validation`], see [`WorkflowRegistry::register`].
    pub fn register(&self, definition: WorkflowDefinition) -> Result<(), EngineError> {
        let stored = self.workflows.register(definition)?;
        info!("workflow '{}' registered ({} tasks)", stored.id, stored.tasks.len());
        self.events.emit(WorkflowEvent::WorkflowRegistered {
            workflow_id: stored.id.clone(),
        });
        Ok(())
    }

    pub fn register_service(&self, id: impl Into<String>, service: Arc<dyn Service>) {
        self.services.register_service(id, service);
    }

    pub fn get_workflow(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(id)
    }

    pub fn list_workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.workflows.list()
    }

    pub fn remove_workflow(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.remove(id)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the registered workflow `id` with `input` and return its record.
    ///
    /// Always branch on the returned execution's `status`: task failures do
    /// not produce `Err`. Neither does a failed save to the execution store,
    /// which is only logged.
    ///
    /// # Errors
    /// - [`EngineError::WorkflowNotFound`] if `id` is not registered.
    /// - [`EngineError::CircularDependency`] if the task graph has a cycle.
    #[instrument(skip(self, input))]
    pub async fn execute_workflow(&self, id: &str, input: Value) -> Result<Execution, EngineError> {
        let definition = self
            .workflows
            .get(id)
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_owned()))?;

        let executor = WorkflowExecutor::new(
            Arc::clone(&self.services),
            self.events.clone(),
            self.config.clone(),
        );
        let execution = executor.run(&definition, input).await?;
        if let Err(err) = self.executions.save(&execution).await {
            error!(execution_id = %execution.id, "failed to save execution: {}", err);
        }
        Ok(execution)
    }

    /// # Errors
    /// [`EngineError::Store`] when the execution store fails.
    pub async fn get_execution(&self, id: Uuid) -> Result<Option<Execution>, EngineError> {
        Ok(self.executions.get(id).await?)
    }

    /// # Errors
    /// [`EngineError::Store`] when the execution store fails.
    pub async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>, EngineError> {
        Ok(self.executions.list_for_workflow(workflow_id).await?)
    }

    // -----------------------------------------------------------------------
    // Buses
    // -----------------------------------------------------------------------

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn streams(&self) -> &StreamBus {
        &self.streams
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}
