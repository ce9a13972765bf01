//! Named publish/subscribe data streams.
//!
//! Streams are independent of workflow execution and carry live data feeds
//! out of band. Delivery is synchronous, unbuffered and best effort:
//! publishing to an unknown or closed stream drops the message.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::EngineError;

/// Descriptive settings for a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    #[serde(default)]
    pub description: String,
    /// Inactive streams accept subscribers but drop every publish.
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            active: true,
        }
    }
}

fn default_active() -> bool {
    true
}

type StreamCallback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Stream {
    config: StreamConfig,
    subscribers: Vec<StreamCallback>,
}

/// Registry of data streams. Cloning shares the streams.
#[derive(Clone, Default)]
pub struct StreamBus {
    streams: Arc<RwLock<HashMap<String, Stream>>>,
}

impl StreamBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `id`, or replace its config if it already exists. Existing
    /// subscribers are kept.
    pub fn create_stream(&self, id: impl Into<String>, config: StreamConfig) {
        let id = id.into();
        debug!(stream_id = %id, active = config.active, "data stream created");
        let mut streams = self.streams.write();
        match streams.get_mut(&id) {
            Some(stream) => stream.config = config,
            None => {
                streams.insert(
                    id,
                    Stream {
                        config,
                        subscribers: Vec::new(),
                    },
                );
            }
        }
    }

    /// Attach `callback` to an existing stream.
    ///
    /// # Errors
    /// [`EngineError::StreamNotFound`] if the stream was never created.
    pub fn subscribe<F>(&self, id: &str, callback: F) -> Result<(), EngineError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut streams = self.streams.write();
        let stream = streams
            .get_mut(id)
            .ok_or_else(|| EngineError::StreamNotFound(id.to_owned()))?;
        stream.subscribers.push(Arc::new(callback));
        Ok(())
    }

    /// Deliver `data` to every current subscriber of `id`.
    ///
    /// Returns how many subscribers were called; `0` when the stream is
    /// unknown or inactive.
    pub fn publish(&self, id: &str, data: Value) -> usize {
        let subscribers: Vec<StreamCallback> = {
            let streams = self.streams.read();
            match streams.get(id) {
                Some(stream) if stream.config.active => stream.subscribers.clone(),
                _ => {
                    trace!(stream_id = id, "publish dropped");
                    return 0;
                }
            }
        };

        for subscriber in &subscribers {
            subscriber(&data);
        }
        subscribers.len()
    }

    /// Mark `id` inactive. Returns `false` if it does not exist.
    pub fn close_stream(&self, id: &str) -> bool {
        match self.streams.write().get_mut(id) {
            Some(stream) => {
                stream.config.active = false;
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.streams.read().get(id).is_some_and(|s| s.config.active)
    }

    pub fn config(&self, id: &str) -> Option<StreamConfig> {
        self.streams.read().get(id).map(|s| s.config.clone())
    }
}

impl std::fmt::Debug for StreamBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let streams = self.streams.read();
        let mut ids: Vec<&String> = streams.keys().collect();
        ids.sort_unstable();
        f.debug_struct("StreamBus").field("streams", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn collector(bus: &StreamBus, id: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(id, move |v| sink.lock().push(v.clone())).expect("stream exists");
        seen
    }

    #[test]
    fn publish_reaches_every_subscriber() {
        let bus = StreamBus::new();
        bus.create_stream("rankings", StreamConfig::default());
        let a = collector(&bus, "rankings");
        let b = collector(&bus, "rankings");

        assert_eq!(bus.publish("rankings", json!({ "rank": 4 })), 2);
        assert_eq!(*a.lock(), vec![json!({ "rank": 4 })]);
        assert_eq!(*b.lock(), vec![json!({ "rank": 4 })]);
    }

    #[test]
    fn subscribing_to_unknown_stream_fails() {
        let bus = StreamBus::new();
        assert!(matches!(
            bus.subscribe("nope", |_| {}),
            Err(EngineError::StreamNotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn inactive_and_unknown_streams_drop_publishes() {
        let bus = StreamBus::new();
        bus.create_stream("feed", StreamConfig::default());
        let seen = collector(&bus, "feed");

        assert!(bus.close_stream("feed"));
        assert!(!bus.is_active("feed"));
        assert_eq!(bus.publish("feed", json!(1)), 0);
        assert_eq!(bus.publish("missing", json!(1)), 0);
        assert!(seen.lock().is_empty());
        assert!(!bus.close_stream("missing"));
    }

    #[test]
    fn recreating_a_stream_keeps_subscribers() {
        let bus = StreamBus::new();
        bus.create_stream("feed", StreamConfig { description: "v1".into(), active: false });
        let seen = collector(&bus, "feed");

        bus.create_stream("feed", StreamConfig { description: "v2".into(), active: true });
        assert_eq!(bus.publish("feed", json!("x")), 1);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(bus.config("feed").unwrap().description, "v2");
    }

    #[test]
    fn stream_without_subscribers_delivers_nothing() {
        let bus = StreamBus::new();
        bus.create_stream("quiet", StreamConfig::default());
        assert_eq!(bus.publish("quiet", json!(null)), 0);
        assert!(bus.is_active("quiet"));
    }
}
