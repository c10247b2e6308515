//! Identity and overlay address primitives for simulated Swarm nodes.
//!
//! Every simulated node is identified by a [`NodeId`]. Its position in the
//! overlay (the Kademlia distance space) is the [`OverlayAddress`] derived from
//! that identifier, and its transport endpoint is the [`Underlay`] derived the
//! same way. Peers exchange these three values as a [`PeerRecord`].

mod address;
mod peer;

pub use address::{MAX_PO, OverlayAddress};
pub use peer::{NodeId, PeerRecord, Underlay};
