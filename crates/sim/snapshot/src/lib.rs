//! Versioned snapshots of simulated networks.
//!
//! A [`Snapshot`] records every node's identity and addresses, each
//! service's captured state and the connection list. Loading it with a
//! [`NetworkBuilder`](vertex_sim_network::NetworkBuilder) rebuilds the same
//! node set with the same up links, without re-running convergence.

mod error;
mod filter;
mod snapshot;

pub use error::{Discrepancy, ReconstructError, SnapshotError};
pub use filter::{FilterError, ServiceFilter};
pub use snapshot::{ConnSnapshot, NodeSnapshot, SNAPSHOT_VERSION, Snapshot};
