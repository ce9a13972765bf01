//! Core domain models for the orchestration engine.
//!
//! These types are the source of truth for what a workflow and a run of it
//! look like in memory. Field names serialise in camelCase so definitions
//! authored as JSON documents load without translation.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// WorkflowTask
// ---------------------------------------------------------------------------

/// How often and how long to wait before re-running a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Retries after the first attempt; `2` means up to three attempts.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTask {
    /// Unique identifier within this workflow (referenced by dependencies).
    pub id: String,
    pub name: String,
    /// Id the target service was registered under.
    pub service: String,
    /// Action to invoke on that service.
    pub action: String,
    /// Action input; string values may hold one `${...}` placeholder.
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Ids of tasks that must settle before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Advisory only. Concurrency is decided by batch membership.
    #[serde(default)]
    pub parallel: bool,
    /// Per-attempt timeout in milliseconds; the executor default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    /// Boolean predicate source, see [`crate::condition`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl WorkflowTask {
    /// Convenience constructor for testing.
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            service: service.into(),
            action: action.into(),
            input: Map::new(),
            dependencies: Vec::new(),
            parallel: false,
            timeout: None,
            retry_policy: None,
            condition: None,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }

    pub fn with_retry(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.retry_policy = Some(RetryPolicy { max_retries, backoff_ms });
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Effective timeout for one attempt.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.map(Duration::from_millis).unwrap_or(default)
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// Descriptive metadata about a service a workflow uses. The callable itself
/// is registered separately with the service registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowService {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

/// What happens when a task fails after its retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorHandling {
    /// Record the failure and keep running the remaining batches.
    RetryThenSkip,
    /// Fail the execution once retries are exhausted.
    #[default]
    RetryThenFail,
    /// Ignore retry policies; the first failure fails the execution.
    FailFast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    /// Emit `monitoring:data` snapshots after each completed task.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

/// Declared persistence intent. Nothing in the engine acts on it; a durable
/// store is supplied by the embedding application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_type: Option<String>,
}

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub services: Vec<WorkflowService>,
    pub tasks: Vec<WorkflowTask>,
    /// Cron-style schedule; informational, nothing triggers on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub state: StateConfig,
}

impl WorkflowDefinition {
    /// Convenience constructor for testing.
    pub fn new(id: impl Into<String>, name: impl Into<String>, tasks: Vec<WorkflowTask>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "1.0.0".into(),
            description: String::new(),
            services: Vec::new(),
            tasks,
            schedule: None,
            error_handling: ErrorHandling::default(),
            monitoring: MonitoringConfig::default(),
            state: StateConfig::default(),
        }
    }

    pub fn with_error_handling(mut self, strategy: ErrorHandling) -> Self {
        self.error_handling = strategy;
        self
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Possible statuses for a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Declared for compatibility with stored records; the engine never
    /// enters it because runs cannot be suspended.
    Paused,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending   => write!(f, "pending"),
            Self::Running   => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed    => write!(f, "failed"),
            Self::Paused    => write!(f, "paused"),
        }
    }
}

/// A task failure recorded against an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub task_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counters for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    /// Tasks whose final attempt succeeded.
    pub tasks_completed: u32,
    /// Tasks that failed at least one attempt, counted once per task.
    pub tasks_failed: u32,
    /// Tasks skipped by their condition.
    pub tasks_skipped: u32,
    /// Wall-clock milliseconds from start to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    pub task_results: BTreeMap<String, Value>,
    pub errors: Vec<ExecutionError>,
    pub metrics: ExecutionMetrics,
}

impl Execution {
    /// A fresh `pending` execution of `workflow_id`.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            current_task: None,
            task_results: BTreeMap::new(),
            errors: Vec::new(),
            metrics: ExecutionMetrics::default(),
        }
    }

    pub(crate) fn record_error(&mut self, task_id: &str, error: impl ToString) {
        self.errors.push(ExecutionError {
            task_id: task_id.to_owned(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Move to a terminal status, stamping `completedAt` and `totalDuration`.
    pub(crate) fn finish(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        let elapsed = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.status = status;
        self.completed_at = Some(now);
        self.metrics.total_duration = Some(elapsed);
    }
}

// ---------------------------------------------------------------------------
// Monitoring
// ---------------------------------------------------------------------------

/// Point-in-time view of a running execution. Ephemeral, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringEvent {
    pub workflow_id: String,
    pub execution_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub metrics: ExecutionMetrics,
    pub status: ExecutionStatus,
    pub current_step: Option<String>,
}

impl MonitoringEvent {
    pub fn snapshot(execution: &Execution) -> Self {
        Self {
            workflow_id: execution.workflow_id.clone(),
            execution_id: execution.id,
            timestamp: Utc::now(),
            metrics: execution.metrics.clone(),
            status: execution.status,
            current_step: execution.current_task.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_loads_from_camel_case_json() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "id": "seo-audit",
            "name": "SEO audit",
            "services": [{ "id": "crawler", "type": "http", "config": { "depth": 2 } }],
            "tasks": [{
                "id": "crawl",
                "name": "Crawl site",
                "service": "crawler",
                "action": "crawl",
                "input": { "url": "${input.url}" },
                "timeout": 5000,
                "retryPolicy": { "maxRetries": 2, "backoffMs": 100 },
                "condition": "url != null"
            }],
            "errorHandling": "retry-then-skip",
            "state": { "persistenceType": "postgres" }
        }))
        .expect("definition should deserialize");

        assert_eq!(def.error_handling, ErrorHandling::RetryThenSkip);
        assert!(def.monitoring.enabled);
        assert_eq!(def.services[0].kind, "http");
        assert_eq!(def.state.persistence_type.as_deref(), Some("postgres"));

        let task = &def.tasks[0];
        assert_eq!(task.retry_policy, Some(RetryPolicy { max_retries: 2, backoff_ms: 100 }));
        assert_eq!(task.timeout_or(Duration::from_secs(60)), Duration::from_millis(5000));
        assert!(task.dependencies.is_empty());
        assert!(!task.parallel);
    }

    #[test]
    fn task_without_timeout_uses_default() {
        let task = WorkflowTask::new("a", "svc", "run");
        assert_eq!(task.timeout_or(Duration::from_secs(60)), Duration::from_secs(60));
    }

    #[test]
    fn execution_serializes_status_lowercase() {
        let mut exec = Execution::new("wf");
        exec.finish(ExecutionStatus::Completed);
        let value = serde_json::to_value(&exec).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["workflowId"], "wf");
        assert!(value["metrics"]["totalDuration"].is_u64());
        assert!(exec.status.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
    }
}
