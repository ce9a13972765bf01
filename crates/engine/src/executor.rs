//! Workflow execution engine.
//!
//! `WorkflowExecutor` drives one run of a workflow:
//! 1. Builds dependency-ordered batches (a cycle is returned as an error
//!    before any `Execution` exists).
//! 2. Runs every task of a batch concurrently and waits for all of them to
//!    settle before starting the next batch.
//! 3. Per task: resolves `${...}` input placeholders, evaluates the
//!    condition, then dispatches through the `ServiceRegistry` with a
//!    timeout and the task's retry policy.
//! 4. Captures task failures into the returned `Execution`; the run itself
//!    never returns `Err` once it has started.
//!
//! Timeouts are best effort. On expiry the action's future is dropped, which
//! stops cooperative async handlers at their next await point, but work a
//! handler spawned elsewhere keeps running. Runs cannot be cancelled or
//! paused.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::condition;
use crate::events::{EventBus, WorkflowEvent};
use crate::models::{
    ErrorHandling, Execution, ExecutionStatus, MonitoringEvent, RetryPolicy, WorkflowDefinition,
    WorkflowTask,
};
use crate::registry::ServiceRegistry;
use crate::resolver::{resolve_input, ResolveContext};
use crate::scheduler::{build_batches, Batch};
use crate::{EngineError, TaskError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-attempt timeout for tasks that do not set their own.
    pub default_task_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_task_timeout: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Task outcome
// ---------------------------------------------------------------------------

/// Terminal result of one task, folded into the `Execution` by the
/// coordinator. Metrics are only ever updated from this value.
#[derive(Debug)]
struct TaskOutcome<'a> {
    task: &'a WorkflowTask,
    result: Result<Value, TaskError>,
    /// Attempts that ended in an error, including a final failing one.
    failed_attempts: u32,
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Runs workflow executions against a shared service registry.
///
/// Holds no per-run state, so one executor may drive many runs
/// concurrently; each run owns the `Execution` it creates.
pub struct WorkflowExecutor {
    services: Arc<ServiceRegistry>,
    events: EventBus,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    /// Create a new executor.
    pub fn new(services: Arc<ServiceRegistry>, events: EventBus, config: ExecutorConfig) -> Self {
        Self { services, events, config }
    }

    /// Run `definition` to completion with the workflow-level `input`.
    ///
    /// # Errors
    /// Only scheduling errors ([`EngineError::CircularDependency`],
    /// [`EngineError::Validation`]) are returned, before any task runs.
    /// Task failures are recorded in the returned execution.
    #[instrument(skip(self, definition, input), fields(workflow_id = %definition.id))]
    pub async fn run(&self, definition: &WorkflowDefinition, input: Value) -> Result<Execution, EngineError> {
        // ------------------------------------------------------------------
        // Plan the run; nothing is recorded if the graph is unschedulable.
        // ------------------------------------------------------------------
        let batches = build_batches(&definition.tasks)?;
        info!(
            "scheduled {} tasks into {} batches",
            definition.tasks.len(),
            batches.len()
        );

        let mut execution = Execution::new(&definition.id);
        execution.status = ExecutionStatus::Running;
        self.events.emit(WorkflowEvent::ExecutionStarted {
            execution_id: execution.id,
            workflow_id: definition.id.clone(),
        });

        // ------------------------------------------------------------------
        // Batches run strictly in order; tasks within one run concurrently.
        // ------------------------------------------------------------------
        for (index, batch) in batches.iter().enumerate() {
            debug!(batch = index, size = batch.len(), "starting batch");

            if let Some((task_id, err)) = self.run_batch(definition, batch, &input, &mut execution).await {
                let message = format!("task '{task_id}' {err}");
                error!(execution_id = %execution.id, "execution failed: {}", message);

                execution.current_task = Some(task_id.clone());
                execution.record_error(&task_id, &err);
                execution.finish(ExecutionStatus::Failed);
                self.events.emit(WorkflowEvent::ExecutionFailed {
                    execution_id: execution.id,
                    error: message,
                });
                return Ok(execution);
            }
        }

        execution.finish(ExecutionStatus::Completed);
        info!(
            "execution {} completed: {} completed, {} failed, {} skipped",
            execution.id,
            execution.metrics.tasks_completed,
            execution.metrics.tasks_failed,
            execution.metrics.tasks_skipped
        );
        self.events.emit(WorkflowEvent::ExecutionCompleted {
            execution_id: execution.id,
        });
        Ok(execution)
    }

    // -----------------------------------------------------------------------
    // Internal: one batch.
    // -----------------------------------------------------------------------

    /// Run every task in `batch` and fold the outcomes into `execution`.
    ///
    /// Returns the first task failure that should fail the execution. All
    /// tasks are drained before returning, even after a failure.
    async fn run_batch<'a>(
        &self,
        definition: &WorkflowDefinition,
        batch: &Batch<'a>,
        input: &Value,
        execution: &mut Execution,
    ) -> Option<(String, TaskError)> {
        let strategy = definition.error_handling;
        let mut in_flight = FuturesUnordered::new();

        for &task in batch {
            self.events.emit(WorkflowEvent::TaskStarted {
                execution_id: execution.id,
                task_id: task.id.clone(),
                task_name: task.name.clone(),
            });

            let resolved = resolve_input(
                &task.input,
                &ResolveContext::new(&execution.task_results, input),
            );

            if !condition_allows(task, &resolved) {
                execution.metrics.tasks_skipped += 1;
                self.events.emit(WorkflowEvent::TaskSkipped {
                    execution_id: execution.id,
                    task_id: task.id.clone(),
                });
                continue;
            }

            execution.current_task = Some(task.id.clone());
            in_flight.push(self.execute_task(task, resolved, strategy));
        }

        let mut failure: Option<(String, TaskError)> = None;

        while let Some(outcome) = in_flight.next().await {
            let TaskOutcome { task, result, failed_attempts } = outcome;

            if failed_attempts > 0 {
                execution.metrics.tasks_failed += 1;
            }

            match result {
                Ok(value) => {
                    info!("task '{}' succeeded", task.id);
                    execution.metrics.tasks_completed += 1;
                    execution.current_task = Some(task.id.clone());
                    execution.task_results.insert(task.id.clone(), value.clone());

                    self.events.emit(WorkflowEvent::TaskCompleted {
                        execution_id: execution.id,
                        task_id: task.id.clone(),
                        result: value,
                    });
                    if definition.monitoring.enabled {
                        self.events.emit_monitoring(MonitoringEvent::snapshot(execution));
                    }
                }

                Err(err) if strategy == ErrorHandling::RetryThenSkip => {
                    warn!("task '{}' failed, skipping it: {}", task.id, err);
                    execution.record_error(&task.id, &err);
                    self.events.emit(WorkflowEvent::TaskSkipped {
                        execution_id: execution.id,
                        task_id: task.id.clone(),
                    });
                }

                Err(err) => {
                    error!("task '{}' failed: {}", task.id, err);
                    if failure.is_none() {
                        failure = Some((task.id.clone(), err));
                    }
                }
            }
        }

        failure
    }

    // -----------------------------------------------------------------------
    // Internal: one task, with timeout and retry.
    // -----------------------------------------------------------------------

    async fn execute_task<'a>(
        &self,
        task: &'a WorkflowTask,
        input: Map<String, Value>,
        strategy: ErrorHandling,
    ) -> TaskOutcome<'a> {
        let policy: Option<RetryPolicy> = match strategy {
            ErrorHandling::FailFast => None,
            _ => task.retry_policy,
        };
        let max_attempts = policy.map_or(1, |p| p.max_retries.saturating_add(1));
        let timeout = task.timeout_or(self.config.default_task_timeout);
        let mut failed_attempts = 0u32;

        loop {
            let dispatch = self.services.dispatch(&task.service, &task.action, input.clone());
            let result = match tokio::time::timeout(timeout, dispatch).await {
                Ok(result) => result,
                Err(_) => Err(TaskError::Timeout { after: timeout }),
            };

            let err = match result {
                Ok(value) => {
                    return TaskOutcome { task, result: Ok(value), failed_attempts };
                }
                Err(err) => err,
            };

            failed_attempts += 1;
            if !err.is_retryable() || failed_attempts >= max_attempts {
                let err = if failed_attempts > 1 {
                    TaskError::RetryExhausted {
                        attempts: failed_attempts,
                        last: Box::new(err),
                    }
                } else {
                    err
                };
                return TaskOutcome { task, result: Err(err), failed_attempts };
            }

            let delay = policy.map(|p| p.backoff()).unwrap_or_default();
            warn!(
                "task '{}' attempt {}/{} failed, retrying in {:?}: {}",
                task.id, failed_attempts, max_attempts, delay, err
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Whether `task` should run given its resolved input.
///
/// A condition that cannot be evaluated skips the task rather than failing it.
fn condition_allows(task: &WorkflowTask, input: &Map<String, Value>) -> bool {
    let Some(source) = task.condition.as_deref() else {
        return true;
    };

    match condition::evaluate(source, input) {
        Ok(true) => true,
        Ok(false) => {
            debug!("task '{}' condition is false, skipping", task.id);
            false
        }
        Err(err) => {
            warn!(
                "task '{}' condition `{}` could not be evaluated, skipping: {}",
                task.id, source, err
            );
            false
        }
    }
}
