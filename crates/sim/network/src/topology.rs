//! Topology rules for the initial wiring of a network.

use serde::{Deserialize, Serialize};

use crate::NetworkError;

/// How nodes are wired before discovery runs.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::VariantNames,
)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Node `i` connects to node `(i + 1) mod n`.
    Ring,
    /// Node `i` connects to node `i + 1`.
    Chain,
    /// Every pair connects once.
    Full,
    /// The pivot connects to every other node.
    Star,
    /// Ring wiring with discovery forced on, so the final connections
    /// emerge from discovery.
    #[default]
    None,
}

impl Topology {
    /// Edges of this topology over `nodes` nodes, as index pairs.
    ///
    /// Pure: the pair order is the dial order (first dials second). `pivot`
    /// only matters for [`Topology::Star`], where it must be in range.
    pub fn edges(&self, nodes: usize, pivot: usize) -> Result<Vec<(usize, usize)>, NetworkError> {
        let edges = match self {
            Self::Ring | Self::None => match nodes {
                0 | 1 => Vec::new(),
                // Both ring edges of a pair name the same connection.
                2 => vec![(0, 1)],
                n => (0..n).map(|i| (i, (i + 1) % n)).collect(),
            },
            Self::Chain => (1..nodes).map(|i| (i - 1, i)).collect(),
            Self::Full => (0..nodes)
                .flat_map(|i| (i + 1..nodes).map(move |j| (i, j)))
                .collect(),
            Self::Star => {
                if pivot >= nodes {
                    return Err(NetworkError::InvalidPivot { pivot, nodes });
                }
                (0..nodes).filter(|&i| i != pivot).map(|i| (pivot, i)).collect()
            }
        };
        Ok(edges)
    }

    /// Whether this topology always runs discovery.
    pub fn forces_discovery(&self) -> bool {
        matches!(self, Self::None)
    }
}
