//! Diagnostic RPC between the coordinator and a node.
//!
//! Requests travel through the node's inbox and are answered on a oneshot
//! channel, so concurrent calls to the same node are served one at a time.

use vertex_swarm_kademlia::{Health, PeerPot};
use vertex_swarm_primitives::{NodeId, PeerRecord};

/// Diagnostic request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcRequest {
    /// Evaluate the node's table against its ideal neighbourhood.
    Healthy(Box<PeerPot>),
    /// List connected peers.
    Peers,
}

impl RpcRequest {
    /// Method name for logs and errors.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Healthy(_) => "healthy",
            Self::Peers => "peers",
        }
    }
}

/// Diagnostic response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcResponse {
    /// Answer to [`RpcRequest::Healthy`].
    Healthy(Health),
    /// Answer to [`RpcRequest::Peers`].
    Peers(Vec<PeerRecord>),
}

/// Diagnostic RPC errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The node stopped before answering.
    #[error("node {0} has stopped")]
    NodeStopped(NodeId),

    /// No service on the node handles the method.
    #[error("node {node} does not serve {method}")]
    Unsupported {
        /// Queried node.
        node: NodeId,
        /// Requested method.
        method: &'static str,
    },

    /// The node answered with the wrong response kind.
    #[error("node {node} answered {method} with an unexpected response")]
    UnexpectedResponse {
        /// Queried node.
        node: NodeId,
        /// Requested method.
        method: &'static str,
    },
}
