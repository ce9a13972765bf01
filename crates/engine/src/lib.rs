//! `engine` crate — workflow definitions, scheduling and the execution engine.

pub mod condition;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod store;
pub mod streams;

pub use error::{EngineError, StoreError, TaskError};
pub use events::{EventBus, SubscriptionId, WorkflowEvent};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use models::{
    ErrorHandling, Execution, ExecutionError, ExecutionMetrics, ExecutionStatus, MonitoringEvent,
    RetryPolicy, WorkflowDefinition, WorkflowService, WorkflowTask,
};
pub use orchestrator::Orchestrator;
pub use scheduler::build_batches;
pub use store::{ExecutionStore, MemoryExecutionStore};
pub use streams::{StreamBus, StreamConfig};
