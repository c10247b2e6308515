//! Error types for health monitoring.

use std::time::Duration;

use vertex_swarm_primitives::NodeId;

use crate::HealthReport;

/// Error type for the convergence wait.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    /// The peer pot index does not cover a node of the network.
    #[error("no peer pot for node {node}")]
    MissingPot {
        /// Node without a pot.
        node: NodeId,
    },

    /// The deadline passed before every node was healthy at once.
    #[error("network did not converge within {elapsed:?}: {report}")]
    Timeout {
        /// Time spent polling.
        elapsed: Duration,
        /// Latest reading of every node.
        report: HealthReport,
    },
}
