//! Event fan-out to connected WebSocket clients.
//!
//! Every [`SwarmEvent`] the orchestrator publishes is serialized once
//! and pushed to each connected client over a bounded per-client queue.
//! Slow clients drop frames; a client that keeps falling behind is
//! disconnected rather than allowed to backpressure the run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use callswarm_core::SwarmEvent;
use callswarm_runtime::{Subscription, SwarmOrchestrator};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::metrics::{
    WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Per-client outbound queue depth.
pub const CLIENT_QUEUE_DEPTH: usize = 64;

/// Maximum total lifetime frame drops before forcibly disconnecting a
/// slow client.
const MAX_TOTAL_DROPS: u64 = 100;

/// One connected WebSocket client.
pub struct ClientConnection {
    /// Connection identifier.
    pub id: String,
    sender: mpsc::Sender<Arc<String>>,
    drops: AtomicU64,
}

impl ClientConnection {
    /// Wrap an outbound queue.
    pub fn new(id: String, sender: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            sender,
            drops: AtomicU64::new(0),
        }
    }

    /// Try to queue one frame; returns false (and counts a drop) when
    /// the client's queue is full or closed.
    pub fn send(&self, frame: Arc<String>) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Lifetime frame drops for this client.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// Manages event broadcasting to connected clients.
pub struct BroadcastManager {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    /// Atomic counter tracking total connections (avoids read-locking
    /// for count queries).
    active_count: AtomicUsize,
}

impl BroadcastManager {
    /// Create a new broadcast manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write();
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
            counter!(WS_CONNECTIONS_TOTAL).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).set(self.active_count.load(Ordering::Relaxed) as f64);
        }
    }

    /// Remove a connection by ID.
    pub fn remove(&self, connection_id: &str) {
        let mut conns = self.connections.write();
        if conns.remove(connection_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
            gauge!(WS_CONNECTIONS_ACTIVE).set(self.active_count.load(Ordering::Relaxed) as f64);
        }
    }

    /// Serialize an event once and fan it out to every client, removing
    /// clients whose lifetime drop count crossed the limit.
    pub fn broadcast(&self, event: &SwarmEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                return;
            }
        };
        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read();
            let mut recipients = 0u32;
            for conn in conns.values() {
                recipients += 1;
                if !conn.send(Arc::clone(&json)) {
                    counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                    let drops = conn.drop_count();
                    if drops >= MAX_TOTAL_DROPS {
                        warn!(conn_id = %conn.id, drops, "disconnecting slow client");
                        to_remove.push(conn.id.clone());
                    } else {
                        warn!(conn_id = %conn.id, total_drops = drops, "failed to send event to client (queue full)");
                    }
                }
            }
            debug!(
                event_type = event.event_type(),
                recipients, "broadcast event"
            );
        }
        for id in &to_remove {
            self.remove(id);
        }
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge orchestrator events into the broadcast manager.
///
/// Subscribes one forwarding handler to every event type. The returned
/// subscriptions keep the bridge attached; they are held by the server
/// for its lifetime.
pub fn attach_bridge(
    orchestrator: &SwarmOrchestrator,
    manager: &Arc<BroadcastManager>,
) -> Vec<Subscription> {
    let manager = Arc::clone(manager);
    orchestrator
        .channel()
        .subscribe_all(Arc::new(move |event: &SwarmEvent| {
            manager.broadcast(event);
        }))
}
