//! Health convergence monitoring for simulated networks.
//!
//! A node is healthy when it is connected to all of its nearest neighbours,
//! knows all of them, and holds enough peers in every shallower bin, as
//! measured against the [`PeerPot`](vertex_swarm_kademlia::PeerPot) computed
//! for it. [`HealthMonitor::wait`] blocks until every node is healthy in the
//! same pass, or reports every node's latest reading when the deadline
//! passes.

mod error;
mod monitor;
mod report;

pub use error::HealthError;
pub use monitor::{
    Convergence, DEFAULT_DEADLINE, DEFAULT_POLL_INTERVAL, HealthConfig, HealthMonitor,
    MonitorState,
};
pub use report::{HealthReport, NodeReport, Reading};
