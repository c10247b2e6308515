//! Error types for snapshot encoding, decoding and replay.

use vertex_sim_network::NetworkError;
use vertex_swarm_primitives::NodeId;

/// Why a captured node could not be rebuilt.
#[derive(Debug, thiserror::Error)]
pub enum ReconstructError {
    /// The captured overlay or underlay is not derived from the identifier.
    #[error("captured addresses are not derived from the node identifier")]
    AddressMismatch,

    /// The network refused the node.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// A loaded network differs from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Discrepancy {
    /// A captured node is absent.
    #[error("node {0} is missing")]
    MissingNode(NodeId),

    /// A captured node has different addresses.
    #[error("node {0} has different addresses")]
    AddressChanged(NodeId),

    /// A captured up connection is not up.
    #[error("connection {a} - {b} is not up")]
    MissingConnection {
        /// First node.
        a: NodeId,
        /// Second node.
        b: NodeId,
    },
}

/// Error type for snapshot operations.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Malformed snapshot document.
    #[error("failed to decode snapshot")]
    Decode(#[source] serde_json::Error),

    /// The snapshot could not be serialized.
    #[error("failed to encode snapshot")]
    Encode(#[source] serde_json::Error),

    /// The document declares a schema version this codec does not read.
    #[error("unsupported snapshot version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Declared version.
        found: u32,
        /// Version this codec reads and writes.
        supported: u32,
    },

    /// A node's services could not be captured.
    #[error("failed to capture node {node}")]
    Capture {
        /// Node being captured.
        node: NodeId,
        /// Cause.
        #[source]
        source: NetworkError,
    },

    /// A captured node could not be rebuilt.
    #[error("failed to reconstruct node {node}")]
    Reconstruct {
        /// Offending node.
        node: NodeId,
        /// Cause.
        #[source]
        source: ReconstructError,
    },

    /// A captured connection could not be re-established.
    #[error("failed to reconnect {a} - {b}")]
    Connection {
        /// First node.
        a: NodeId,
        /// Second node.
        b: NodeId,
        /// Cause.
        #[source]
        source: NetworkError,
    },

    /// Network construction failed for a reason not tied to one node.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A network does not contain what the snapshot captured.
    #[error("network does not match snapshot: {0}")]
    Mismatch(#[from] Discrepancy),
}
