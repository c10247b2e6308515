//! Per-node readings and the report built from them.

use std::fmt;

use vertex_sim_network::RpcError;
use vertex_swarm_kademlia::Health;
use vertex_swarm_primitives::{NodeId, OverlayAddress};

/// Latest health reading of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    /// No answer yet in this polling phase.
    Missing,
    /// The node answered.
    Health(Health),
    /// The query failed.
    Failed(RpcError),
}

impl Reading {
    /// Whether the node answered healthy.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Health(health) if health.is_healthy())
    }
}

impl From<Result<Health, RpcError>> for Reading {
    fn from(result: Result<Health, RpcError>) -> Self {
        match result {
            Ok(health) => Self::Health(health),
            Err(error) => Self::Failed(error),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("no reading"),
            Self::Health(health) => write!(f, "{health}"),
            Self::Failed(error) => write!(f, "query failed: {error}"),
        }
    }
}

/// Reading of one node, with its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    /// Node identifier.
    pub id: NodeId,
    /// Overlay address.
    pub overlay: OverlayAddress,
    /// Latest reading.
    pub reading: Reading,
}

/// Latest reading of every node, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Per-node readings.
    pub nodes: Vec<NodeReport>,
}

impl HealthReport {
    /// Nodes that are not healthy.
    pub fn unhealthy(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|node| !node.reading.is_healthy())
    }

    /// Number of unhealthy nodes.
    pub fn unhealthy_count(&self) -> usize {
        self.unhealthy().count()
    }

    /// Whether every node is healthy.
    pub fn is_healthy(&self) -> bool {
        self.unhealthy_count() == 0
    }

    /// Number of nodes covered.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the report covers no node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} nodes unhealthy", self.unhealthy_count(), self.len())?;
        for node in self.unhealthy() {
            write!(f, "\n  {} ({}): {}", node.id, node.overlay.short(), node.reading)?;
        }
        Ok(())
    }
}
