//! In-process transport.
//!
//! Two connected endpoints share nothing but their subscriber tables. Delivery is
//! synchronous: `publish` invokes the peer's handlers before returning.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use crate::serializer::Payload;
use crate::transport;
use crate::transport::Handler;
use crate::transport::Transport;

type Subscribers = DashMap<String, Vec<Handler>>;

/// One end of an in-memory channel.
///
/// Clones share the same end, so several endpoints with distinct keys can
/// multiplex over one pair.
#[derive(Clone)]
pub struct MemoryTransport {
    local: Arc<Subscribers>,
    remote: Option<Arc<Subscribers>>,
    closed: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Creates a pair of transports connected to each other.
    ///
    /// Payloads published on `a` reach the subscribers of `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        let subs_a = Arc::new(DashMap::new());
        let subs_b = Arc::new(DashMap::new());

        let a = Self {
            local: subs_a.clone(),
            remote: Some(subs_b.clone()),
            closed: Arc::new(AtomicBool::new(false)),
        };

        let b = Self {
            local: subs_b,
            remote: Some(subs_a),
            closed: Arc::new(AtomicBool::new(false)),
        };

        (a, b)
    }

    /// A transport with no peer. Everything published is lost.
    pub fn detached() -> Self {
        Self {
            local: Arc::new(DashMap::new()),
            remote: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Closes this end. Later publishes fail with `ConnectionLost`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of handlers subscribed on this end for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.local.get(event).map_or(0, |handlers| handlers.len())
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    fn subscribe(&self, event: &str, handler: Handler) {
        self.local.entry(event.to_string()).or_default().push(handler);
    }

    async fn publish(&self, event: &str, payload: Payload) -> transport::Result<()> {
        if self.is_closed() {
            return Err(transport::Error::ConnectionLost("Channel closed".into()));
        }

        let Some(remote) = &self.remote else {
            return Ok(());
        };

        // Snapshot the handlers so none runs while the table is locked.
        let handlers: Vec<Handler> = match remote.get(event) {
            Some(entry) => entry.value().clone(),
            None => return Ok(()),
        };

        for handler in handlers {
            handler(payload.clone());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::value::Value;

    fn recorder() -> (Handler, Arc<Mutex<Vec<Payload>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Handler = Arc::new(move |payload| sink.lock().unwrap().push(payload));
        (handler, seen)
    }

    #[tokio::test]
    async fn test_pair_is_point_to_point() {
        let (a, b) = MemoryTransport::pair();
        let (on_a, seen_a) = recorder();
        let (on_b, seen_b) = recorder();
        a.subscribe("evt", on_a);
        b.subscribe("evt", on_b);

        a.publish("evt", Payload::Value(Value::from(1))).await.unwrap();

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(*seen_b.lock().unwrap(), vec![Payload::Value(Value::from(1))]);
    }

    #[tokio::test]
    async fn test_events_are_isolated() {
        let (a, b) = MemoryTransport::pair();
        let (on_b, seen_b) = recorder();
        b.subscribe("x-call", on_b);

        a.publish("y-call", Payload::Text("ignored".into())).await.unwrap();
        assert!(seen_b.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_end_rejects_publish() {
        let (a, _b) = MemoryTransport::pair();
        a.close();
        let err = a.publish("evt", Payload::Value(Value::Null)).await.unwrap_err();
        assert!(matches!(err, transport::Error::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn test_detached_drops_everything() {
        let lonely = MemoryTransport::detached();
        lonely.publish("evt", Payload::Value(Value::Null)).await.unwrap();
        assert_eq!(lonely.subscriber_count("evt"), 0);
    }
}
