//! Health of a node's table measured against its [`PeerPot`](crate::PeerPot).

use serde::{Deserialize, Serialize};
use vertex_swarm_primitives::OverlayAddress;

/// Result of one health evaluation.
///
/// Transient: recomputed on every query, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Connected to at least one peer and to every nearest neighbour.
    pub got_nearest_neighbours: bool,
    /// Every nearest neighbour is known (connected or not).
    pub knows_nearest_neighbours: bool,
    /// Every populated bin below the depth holds its expected peers.
    pub saturated: bool,
    /// Nearest neighbours that are not connected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_neighbours: Vec<OverlayAddress>,
    /// Bins below the depth holding too few connected peers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsaturated_bins: Vec<u8>,
    /// Connected peers, deepest bin first.
    pub peers: Vec<OverlayAddress>,
}

impl Health {
    /// All three conditions hold.
    pub fn is_healthy(&self) -> bool {
        self.got_nearest_neighbours && self.knows_nearest_neighbours && self.saturated
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "got nearest neighbours: {}, knows nearest neighbours: {}, saturated: {}, peers: {}",
            self.got_nearest_neighbours,
            self.knows_nearest_neighbours,
            self.saturated,
            self.peers.len()
        )?;
        if !self.missing_neighbours.is_empty() {
            let missing: Vec<_> = self.missing_neighbours.iter().map(|a| a.short()).collect();
            write!(f, ", missing: [{}]", missing.join(", "))?;
        }
        if !self.unsaturated_bins.is_empty() {
            write!(f, ", unsaturated bins: {:?}", self.unsaturated_bins)?;
        }
        Ok(())
    }
}
