//! Named-event channel for `SwarmEvent` fan-out.
//!
//! Synchronous pub/sub: `publish` invokes every current subscriber of the
//! event's type, in subscription order, before returning. There is no
//! queueing or backpressure. A panicking handler is isolated — it is
//! caught, counted, and logged, and never prevents remaining handlers
//! from running.
//!
//! Subscribers are read-only consumers of event payloads. Handlers must
//! not call back into run control; publication happens while the
//! orchestrator holds its state lock.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use callswarm_core::SwarmEvent;
use metrics::counter;
use parking_lot::Mutex;
use tracing::warn;

type Handler = Arc<dyn Fn(&SwarmEvent) + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscribers: HashMap<String, Vec<Entry>>,
}

/// In-process publish/subscribe channel for swarm lifecycle events.
pub struct EventChannel {
    inner: Arc<Mutex<Inner>>,
}

impl EventChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Subscribe a handler to one event type.
    ///
    /// The returned [`Subscription`] detaches the handler; dropping it
    /// without calling [`Subscription::unsubscribe`] leaves the handler
    /// attached for the channel's lifetime.
    pub fn subscribe(
        &self,
        event_type: &str,
        handler: impl Fn(&SwarmEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_arc(event_type, Arc::new(handler))
    }

    /// Subscribe a shared handler to one event type.
    pub fn subscribe_arc(&self, event_type: &str, handler: Handler) -> Subscription {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .subscribers
            .entry(event_type.to_string())
            .or_default()
            .push(Entry { id, handler });
        Subscription {
            event_type: event_type.to_string(),
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe one shared handler to every swarm event type.
    pub fn subscribe_all(&self, handler: Handler) -> Vec<Subscription> {
        SwarmEvent::EVENT_TYPES
            .iter()
            .map(|event_type| self.subscribe_arc(event_type, Arc::clone(&handler)))
            .collect()
    }

    /// Publish an event to all current subscribers of its type.
    ///
    /// Returns the number of handlers that ran without panicking.
    pub fn publish(&self, event: &SwarmEvent) -> usize {
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock();
            match inner.subscribers.get(event.event_type()) {
                Some(entries) => entries.iter().map(|e| Arc::clone(&e.handler)).collect(),
                None => return 0,
            }
        };
        let mut delivered = 0;
        for handler in handlers {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
            if outcome.is_ok() {
                delivered += 1;
            } else {
                counter!("swarm_event_handler_panics_total").increment(1);
                warn!(
                    event_type = event.event_type(),
                    run_id = event.run_id(),
                    "event handler panicked, continuing with remaining handlers"
                );
            }
        }
        delivered
    }

    /// Remove all subscribers for one event type, or every event type
    /// when `event_type` is `None`. Used at run teardown so no event
    /// from a stale run reaches a fresh run's subscribers.
    pub fn clear(&self, event_type: Option<&str>) {
        let mut inner = self.inner.lock();
        match event_type {
            Some(name) => {
                let _ = inner.subscribers.remove(name);
            }
            None => inner.subscribers.clear(),
        }
    }

    /// Number of subscribers for one event type.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(event_type)
            .map_or(0, Vec::len)
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle detaching one subscribed handler.
pub struct Subscription {
    event_type: String,
    id: u64,
    inner: Weak<Mutex<Inner>>,
}

impl Subscription {
    /// Detach the handler. Idempotent — calling twice (or after `clear`)
    /// is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock();
            if let Some(entries) = inner.subscribers.get_mut(&self.event_type) {
                entries.retain(|e| e.id != self.id);
            }
        }
    }
}
