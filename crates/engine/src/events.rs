//! Lifecycle and monitoring events.
//!
//! Listeners are plain callbacks invoked synchronously on the emitting task,
//! in subscription order. There is no buffering or acknowledgement: a slow
//! listener delays the engine, and a listener must not block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::MonitoringEvent;

/// Lifecycle notifications emitted by the registry and the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum WorkflowEvent {
    #[serde(rename = "workflow:registered", rename_all = "camelCase")]
    WorkflowRegistered { workflow_id: String },

    #[serde(rename = "execution:started", rename_all = "camelCase")]
    ExecutionStarted { execution_id: Uuid, workflow_id: String },

    #[serde(rename = "execution:completed", rename_all = "camelCase")]
    ExecutionCompleted { execution_id: Uuid },

    #[serde(rename = "execution:failed", rename_all = "camelCase")]
    ExecutionFailed { execution_id: Uuid, error: String },

    #[serde(rename = "task:started", rename_all = "camelCase")]
    TaskStarted { execution_id: Uuid, task_id: String, task_name: String },

    #[serde(rename = "task:completed", rename_all = "camelCase")]
    TaskCompleted { execution_id: Uuid, task_id: String, result: Value },

    #[serde(rename = "task:skipped", rename_all = "camelCase")]
    TaskSkipped { execution_id: Uuid, task_id: String },
}

impl WorkflowEvent {
    /// Wire name, e.g. `task:completed`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowRegistered { .. } => "workflow:registered",
            Self::ExecutionStarted { .. }   => "execution:started",
            Self::ExecutionCompleted { .. } => "execution:completed",
            Self::ExecutionFailed { .. }    => "execution:failed",
            Self::TaskStarted { .. }        => "task:started",
            Self::TaskCompleted { .. }      => "task:completed",
            Self::TaskSkipped { .. }        => "task:skipped",
        }
    }
}

/// Handle returned by `subscribe_*`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Listeners for one event type.
struct Observers<E> {
    listeners: Vec<(SubscriptionId, Listener<E>)>,
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self { listeners: Vec::new() }
    }
}

impl<E> Observers<E> {
    fn add(&mut self, id: SubscriptionId, listener: Listener<E>) -> SubscriptionId {
        self.listeners.push((id, listener));
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn snapshot(&self) -> Vec<Listener<E>> {
        self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

#[derive(Default)]
struct Channels {
    /// Shared across channels so an id names exactly one listener.
    next_id: AtomicU64,
    lifecycle: RwLock<Observers<WorkflowEvent>>,
    monitoring: RwLock<Observers<MonitoringEvent>>,
}

/// Typed event bus with one channel per event category.
///
/// Cloning is cheap; clones share listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<Channels>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_lifecycle<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.channels.lifecycle.write().add(id, Arc::new(listener))
    }

    pub fn subscribe_monitoring<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&MonitoringEvent) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.channels.monitoring.write().add(id, Arc::new(listener))
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.channels.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Remove a listener from whichever channel holds it.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.channels.lifecycle.write().remove(id) || self.channels.monitoring.write().remove(id)
    }

    // Listeners run outside the lock so they may subscribe or unsubscribe.
    pub fn emit(&self, event: WorkflowEvent) {
        let listeners = self.channels.lifecycle.read().snapshot();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn emit_monitoring(&self, event: MonitoringEvent) {
        let listeners = self.channels.monitoring.read().snapshot();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.channels.lifecycle.read().listeners.len() + self.channels.monitoring.read().listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Execution;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn lifecycle_listeners_receive_events_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_lifecycle(move |e| sink.lock().push(e.name()));

        bus.emit(WorkflowEvent::WorkflowRegistered { workflow_id: "wf".into() });
        bus.emit(WorkflowEvent::ExecutionCompleted { execution_id: Uuid::nil() });

        assert_eq!(*seen.lock(), vec!["workflow:registered", "execution:completed"]);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe_lifecycle(move |_| *c.lock() += 1);

        bus.emit(WorkflowEvent::WorkflowRegistered { workflow_id: "a".into() });
        assert!(bus.unsubscribe(id));
        bus.emit(WorkflowEvent::WorkflowRegistered { workflow_id: "b".into() });

        assert_eq!(*count.lock(), 1);
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn monitoring_channel_is_separate() {
        let bus = EventBus::new();
        let lifecycle = Arc::new(Mutex::new(0));
        let monitoring = Arc::new(Mutex::new(Vec::new()));
        let (l, m) = (Arc::clone(&lifecycle), Arc::clone(&monitoring));
        bus.subscribe_lifecycle(move |_| *l.lock() += 1);
        bus.subscribe_monitoring(move |e| m.lock().push(e.workflow_id.clone()));

        bus.emit_monitoring(MonitoringEvent::snapshot(&Execution::new("wf")));

        assert_eq!(*lifecycle.lock(), 0);
        assert_eq!(*monitoring.lock(), vec!["wf"]);
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let bus = EventBus::new();
        let inner = bus.clone();
        bus.subscribe_lifecycle(move |_| {
            inner.subscribe_lifecycle(|_| {});
        });
        bus.emit(WorkflowEvent::WorkflowRegistered { workflow_id: "wf".into() });
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn events_serialize_with_wire_names() {
        let event = WorkflowEvent::TaskCompleted {
            execution_id: Uuid::nil(),
            task_id: "crawl".into(),
            result: json!({ "pages": 2 }),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "task:completed");
        assert_eq!(value["taskId"], "crawl");
        assert_eq!(value["result"]["pages"], 2);
    }
}
