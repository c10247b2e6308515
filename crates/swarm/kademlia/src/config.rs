//! Kademlia table configuration.
//!
//! # Bin size
//!
//! `min_prox_bin_size` plays two roles:
//!
//! - **Neighbourhood**: the nearest-neighbour set grows from the closest peer
//!   outwards until it holds at least this many peers; the bin where that
//!   happens is the neighbourhood depth.
//!
//! - **Saturation**: every populated bin shallower than the depth should hold
//!   at least this many connected peers (or every peer the network has in
//!   that bin, when there are fewer).

/// Default minimum number of peers per proximity bin.
pub const DEFAULT_MIN_PROX_BIN_SIZE: usize = 2;

/// Default cap on dials started by one evaluation round.
pub const DEFAULT_MAX_DIALS_PER_ROUND: usize = 16;

/// Configuration for a [`KademliaTable`](crate::KademliaTable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KademliaConfig {
    /// Minimum peers per populated bin, and minimum size of the
    /// nearest-neighbour set.
    pub min_prox_bin_size: usize,

    /// Maximum connection candidates handed out per evaluation.
    pub max_dials_per_round: usize,
}

impl Default for KademliaConfig {
    fn default() -> Self {
        Self {
            min_prox_bin_size: DEFAULT_MIN_PROX_BIN_SIZE,
            max_dials_per_round: DEFAULT_MAX_DIALS_PER_ROUND,
        }
    }
}

impl KademliaConfig {
    /// Set the minimum bin size.
    pub fn with_min_prox_bin_size(mut self, size: usize) -> Self {
        self.min_prox_bin_size = size;
        self
    }
}
