//! Network and peer events, and a non-blocking broadcast emitter.

use tokio::sync::broadcast;
use vertex_swarm_primitives::{NodeId, PeerRecord};

/// Network-wide lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A node's actor started.
    NodeUp(NodeId),
    /// A node's actor stopped.
    NodeDown(NodeId),
    /// A connection came up. `a` dialled `b`.
    ConnUp {
        /// Dialling node.
        a: NodeId,
        /// Dialled node.
        b: NodeId,
    },
    /// A connection went down.
    ConnDown {
        /// Dialling node.
        a: NodeId,
        /// Dialled node.
        b: NodeId,
    },
}

impl NetworkEvent {
    /// Whether this is a connection event.
    pub fn is_connection_event(&self) -> bool {
        matches!(self, Self::ConnUp { .. } | Self::ConnDown { .. })
    }
}

/// Peer activity seen by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A peer connected.
    Added(PeerRecord),
    /// A peer disconnected.
    Dropped(PeerRecord),
    /// A service message arrived from a peer.
    Message {
        /// Sender.
        from: NodeId,
        /// Service the message was addressed to.
        service: String,
    },
}

/// Default capacity of event channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug)]
pub struct EventEmitter<E> {
    tx: broadcast::Sender<E>,
}

impl<E> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Clone> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl<E: Clone> EventEmitter<E> {
    /// Create an emitter buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event; dropped when nobody listens.
    pub fn emit(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }
}
