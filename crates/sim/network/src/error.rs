//! Error types for the simulated network.

use vertex_swarm_primitives::NodeId;

use crate::Topology;

/// Error type for network construction and wiring.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// A network was requested with zero nodes.
    #[error("a network needs at least one node")]
    NoNodes,

    /// Two node specs carry the same identifier.
    #[error("duplicate node {0}")]
    DuplicateNode(NodeId),

    /// The node is not part of this network.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// No factory is registered under this service name.
    #[error("no service registered as {0:?}")]
    UnknownService(String),

    /// A service factory failed for a node.
    #[error("service {service:?} failed to start on node {node}")]
    Service {
        /// Node being constructed.
        node: NodeId,
        /// Name of the failing service.
        service: String,
        /// Factory error.
        #[source]
        source: Box<ServiceError>,
    },

    /// A node was asked to connect to itself.
    #[error("node {0} cannot connect to itself")]
    SelfConnection(NodeId),

    /// The pair is already connected.
    #[error("{a} and {b} are already connected")]
    AlreadyConnected {
        /// First node.
        a: NodeId,
        /// Second node.
        b: NodeId,
    },

    /// The pair is not connected.
    #[error("{a} and {b} are not connected")]
    NotConnected {
        /// First node.
        a: NodeId,
        /// Second node.
        b: NodeId,
    },

    /// The node's actor is no longer running.
    #[error("node {0} has stopped")]
    NodeStopped(NodeId),

    /// Star pivot outside the node range.
    #[error("pivot {pivot} is out of range for {nodes} nodes")]
    InvalidPivot {
        /// Requested pivot index.
        pivot: usize,
        /// Number of nodes.
        nodes: usize,
    },

    /// Wiring a topology edge failed; every edge made so far was removed.
    #[error("{topology} topology failed on edge {a} - {b}")]
    Topology {
        /// Topology being wired.
        topology: Topology,
        /// First node of the failing edge.
        a: NodeId,
        /// Second node of the failing edge.
        b: NodeId,
        /// Cause.
        #[source]
        source: Box<NetworkError>,
    },

    /// A connection appeared before any topology was requested.
    #[error("connection {a} - {b} came up before any topology was requested")]
    NotQuiescent {
        /// Dialling node.
        a: NodeId,
        /// Dialled node.
        b: NodeId,
    },
}

/// Error type for node services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Captured service state could not be restored.
    #[error("invalid service state")]
    InvalidState(#[from] serde_json::Error),

    /// A peer sent something the service does not understand.
    #[error("protocol violation by {peer}: {reason}")]
    Protocol {
        /// Offending peer.
        peer: NodeId,
        /// What was wrong.
        reason: String,
    },

    /// A network operation issued by the service failed.
    #[error(transparent)]
    Network(#[from] NetworkError),
}
