//! Kademlia bins, nearest-neighbour oracle and health evaluation.
//!
//! # Architecture
//!
//! A [`KademliaTable`] belongs to one node and maintains two sets of peers:
//! - `known_peers`: discovered peers we might want to connect to
//! - `connected_peers`: currently connected peers
//!
//! Its owner periodically asks it for [`peers_to_connect`](KademliaTable::peers_to_connect),
//! which selects peers based on:
//! 1. Neighbour connections (PO >= depth), all of them
//! 2. Balanced connections (PO < depth), up to the minimum bin size
//!
//! A [`PeerPotIndex`] computes, from the complete address set of a network,
//! what every table should converge to. [`KademliaTable::health`] compares a
//! live table with its [`PeerPot`].

mod config;
mod health;
mod peerpot;
mod pslice;

pub use config::{DEFAULT_MAX_DIALS_PER_ROUND, DEFAULT_MIN_PROX_BIN_SIZE, KademliaConfig};
pub use health::Health;
pub use peerpot::{BinTarget, PeerPot, PeerPotIndex, neighbourhood_depth};
pub use pslice::{NUM_BINS, PSlice};

use std::collections::HashSet;

use tracing::{debug, trace};
use vertex_swarm_primitives::{MAX_PO, OverlayAddress};

/// Kademlia table of a single node.
#[derive(Debug, Clone)]
pub struct KademliaTable {
    /// Our own overlay address.
    base: OverlayAddress,

    /// Discovered peers we are not connected to.
    known_peers: PSlice,

    /// Currently connected peers.
    connected_peers: PSlice,

    /// Peers we're currently trying to connect to (dial in progress).
    pending_connections: HashSet<OverlayAddress>,

    /// Configuration.
    config: KademliaConfig,
}

impl KademliaTable {
    /// Create an empty table for `base`.
    pub fn new(base: OverlayAddress, config: KademliaConfig) -> Self {
        Self {
            base,
            known_peers: PSlice::new(),
            connected_peers: PSlice::new(),
            pending_connections: HashSet::new(),
            config,
        }
    }

    /// Our own overlay address.
    pub fn base(&self) -> OverlayAddress {
        self.base
    }

    /// Table configuration.
    pub fn config(&self) -> &KademliaConfig {
        &self.config
    }

    fn proximity(&self, peer: &OverlayAddress) -> u8 {
        self.base.proximity(peer)
    }

    /// Add discovered peers. Returns how many were new.
    pub fn add_peers(&mut self, peers: &[OverlayAddress]) -> usize {
        let mut added = 0;
        for peer in peers {
            if *peer == self.base || self.connected_peers.exists(peer) {
                continue;
            }
            let po = self.proximity(peer);
            if self.known_peers.add(*peer, po) {
                added += 1;
            }
        }

        if added > 0 {
            debug!(
                base = %self.base.short(),
                added,
                total = self.known_peers.len(),
                "added known peers"
            );
        }
        added
    }

    /// Record a new connection.
    pub fn connected(&mut self, peer: OverlayAddress) {
        self.pending_connections.remove(&peer);

        let po = self.proximity(&peer);
        if self.connected_peers.add(peer, po) {
            self.known_peers.remove(&peer);
            trace!(
                base = %self.base.short(),
                peer = %peer.short(),
                po,
                connected = self.connected_peers.len(),
                "peer connected"
            );
        }
    }

    /// Record a dropped connection. The peer stays known for reconnection.
    pub fn disconnected(&mut self, peer: &OverlayAddress) {
        if self.connected_peers.remove(peer) {
            let po = self.proximity(peer);
            self.known_peers.add(*peer, po);
            trace!(
                base = %self.base.short(),
                peer = %peer.short(),
                po,
                connected = self.connected_peers.len(),
                "peer disconnected"
            );
        }
    }

    /// Whether `peer` is connected.
    pub fn is_connected(&self, peer: &OverlayAddress) -> bool {
        self.connected_peers.exists(peer)
    }

    /// Whether `peer` is known, connected or not.
    pub fn knows(&self, peer: &OverlayAddress) -> bool {
        self.known_peers.exists(peer) || self.connected_peers.exists(peer)
    }

    /// Connected peers, deepest bin first.
    pub fn connected_peers(&self) -> Vec<OverlayAddress> {
        self.connected_peers
            .iter_by_proximity_desc()
            .map(|(_, peer)| peer)
            .collect()
    }

    /// Current neighbourhood depth, from everything the table knows.
    pub fn depth(&self) -> u8 {
        neighbourhood_depth(
            &self.base,
            self.known_peers.iter().chain(self.connected_peers.iter()),
            self.config.min_prox_bin_size,
        )
    }

    /// Mark a peer as being dialed.
    pub fn start_connecting(&mut self, peer: OverlayAddress) {
        self.pending_connections.insert(peer);
    }

    /// Mark a dial as failed so the peer can be selected again.
    pub fn connection_failed(&mut self, peer: &OverlayAddress) {
        self.pending_connections.remove(peer);
    }

    /// Peers we should dial now.
    pub fn peers_to_connect(&self) -> Vec<OverlayAddress> {
        let depth = self.depth();
        let max = self.config.max_dials_per_round;
        let mut candidates = Vec::new();

        self.connect_neighbours(&mut candidates, depth, max);
        self.connect_balanced(&mut candidates, depth, max);
        candidates
    }

    /// Add neighbour connection candidates.
    fn connect_neighbours(&self, candidates: &mut Vec<OverlayAddress>, depth: u8, max: usize) {
        // Iterate known peers from deepest to shallowest
        for (po, peer) in self.known_peers.iter_by_proximity_desc() {
            if candidates.len() >= max || po < depth {
                break;
            }
            if self.pending_connections.contains(&peer) {
                continue;
            }
            candidates.push(peer);
        }
    }

    /// Add balanced connection candidates for bins below the depth.
    fn connect_balanced(&self, candidates: &mut Vec<OverlayAddress>, depth: u8, max: usize) {
        for po in (0..depth).rev() {
            if candidates.len() >= max {
                break;
            }

            let pending = self
                .pending_connections
                .iter()
                .filter(|peer| self.proximity(peer) == po)
                .count();
            let have = self.connected_peers.bin_size(po) + pending;
            let need = self.config.min_prox_bin_size.saturating_sub(have);

            let room = max - candidates.len();
            candidates.extend(
                self.known_peers
                    .peers_in_bin(po)
                    .into_iter()
                    .filter(|peer| !self.pending_connections.contains(peer))
                    .take(need.min(room)),
            );
        }
    }

    /// Evaluate the table against its ideal neighbourhood.
    pub fn health(&self, pot: &PeerPot) -> Health {
        let missing_neighbours: Vec<_> = pot
            .nearest
            .iter()
            .filter(|peer| !self.connected_peers.exists(peer))
            .copied()
            .collect();
        let knows_nearest_neighbours = pot.nearest.iter().all(|peer| self.knows(peer));
        let unsaturated_bins: Vec<_> = pot
            .bins
            .iter()
            .filter(|bin| self.connected_peers.bin_size(bin.po) < bin.expected)
            .map(|bin| bin.po)
            .collect();

        // A node alone in its network has nothing to find.
        let found_any = pot.nearest.is_empty() || !self.connected_peers.is_empty();

        Health {
            got_nearest_neighbours: found_any && missing_neighbours.is_empty(),
            knows_nearest_neighbours,
            saturated: unsaturated_bins.is_empty(),
            missing_neighbours,
            unsaturated_bins,
            peers: self.connected_peers(),
        }
    }

    /// Get statistics about the table.
    pub fn stats(&self) -> TopologyStats {
        TopologyStats {
            known_peers: self.known_peers.len(),
            connected_peers: self.connected_peers.len(),
            depth: self.depth(),
            pending_connections: self.pending_connections.len(),
        }
    }

    /// Log the current bin populations.
    ///
    /// Format: `bin:connected/known` for non-empty bins, depth bin in brackets.
    pub fn log_status(&self) {
        let connected_bins = self.connected_peers.bin_sizes();
        let known_bins = self.known_peers.bin_sizes();
        let depth = self.depth();

        let mut bin_status = String::new();
        for (po, (c, k)) in (0..=MAX_PO).zip(connected_bins.iter().zip(known_bins.iter())) {
            if *c == 0 && *k == 0 {
                continue;
            }
            if !bin_status.is_empty() {
                bin_status.push(' ');
            }
            if po == depth {
                bin_status.push_str(&format!("[{po}:{c}/{k}]"));
            } else {
                bin_status.push_str(&format!("{po}:{c}/{k}"));
            }
        }
        if bin_status.is_empty() {
            bin_status = "(empty)".to_string();
        }

        debug!(
            base = %self.base.short(),
            depth,
            connected = self.connected_peers.len(),
            known = self.known_peers.len(),
            bins = %bin_status,
            "kademlia table"
        );
    }
}

/// Statistics about the table state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyStats {
    /// Number of known (discovered but not connected) peers.
    pub known_peers: usize,
    /// Number of connected peers.
    pub connected_peers: usize,
    /// Current neighbourhood depth.
    pub depth: u8,
    /// Number of pending connection attempts.
    pub pending_connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr_from_byte(b: u8) -> OverlayAddress {
        let mut bytes = [0u8; 32];
        bytes[0] = b;
        OverlayAddress::from(bytes)
    }

    fn make_table(min_prox_bin_size: usize) -> KademliaTable {
        KademliaTable::new(
            addr_from_byte(0x00),
            KademliaConfig::default().with_min_prox_bin_size(min_prox_bin_size),
        )
    }

    #[test]
    fn test_add_and_connect_peers() {
        let mut table = make_table(2);

        let peer1 = addr_from_byte(0x80); // PO 0
        let peer2 = addr_from_byte(0x40); // PO 1

        assert_eq!(table.add_peers(&[peer1, peer2, table.base()]), 2);
        assert_eq!(table.stats().known_peers, 2);

        table.connected(peer1);
        assert_eq!(table.stats().known_peers, 1);
        assert_eq!(table.stats().connected_peers, 1);

        // Connected peers are not re-added as known.
        assert_eq!(table.add_peers(&[peer1]), 0);
        assert!(table.knows(&peer1));
    }

    #[test]
    fn test_disconnect_keeps_peer_known() {
        let mut table = make_table(2);
        let peer = addr_from_byte(0x80);

        table.add_peers(&[peer]);
        table.connected(peer);
        assert!(table.is_connected(&peer));

        table.disconnected(&peer);
        assert!(!table.is_connected(&peer));
        assert!(table.knows(&peer));
    }

    #[test]
    fn test_peers_to_connect_prefers_neighbours() {
        let mut table = make_table(2);
        let neighbours = [addr_from_byte(0x10), addr_from_byte(0x20), addr_from_byte(0x30)];
        let shallow = [addr_from_byte(0x80), addr_from_byte(0xc0), addr_from_byte(0xa0)];

        table.add_peers(&neighbours);
        table.add_peers(&shallow);
        assert_eq!(table.depth(), 2);

        let candidates = table.peers_to_connect();
        // All neighbours, then two of the three bin-0 peers.
        assert_eq!(&candidates[..3], &neighbours);
        assert_eq!(candidates.len(), 5);
        assert!(candidates[3..].iter().all(|p| shallow.contains(p)));
    }

    #[test]
    fn test_pending_peers_are_not_selected_twice() {
        let mut table = make_table(1);
        let peer = addr_from_byte(0x80);
        table.add_peers(&[peer]);

        assert_eq!(table.peers_to_connect(), vec![peer]);
        table.start_connecting(peer);
        assert!(table.peers_to_connect().is_empty());

        table.connection_failed(&peer);
        assert_eq!(table.peers_to_connect(), vec![peer]);
    }

    #[test]
    fn test_health_against_pot() {
        let all: Vec<_> = [0x00, 0x10, 0x20, 0x30, 0x40, 0x80, 0xc0]
            .into_iter()
            .map(addr_from_byte)
            .collect();
        let index = PeerPotIndex::build(&all, 2);
        let pot = index.get(&addr_from_byte(0x00)).unwrap();

        let mut table = make_table(2);
        let health = table.health(pot);
        assert!(!health.got_nearest_neighbours);
        assert!(!health.knows_nearest_neighbours);
        assert!(!health.is_healthy());

        table.add_peers(&all);
        let health = table.health(pot);
        assert!(health.knows_nearest_neighbours);
        assert!(!health.got_nearest_neighbours);
        assert_eq!(health.missing_neighbours.len(), 3);
        assert_eq!(health.unsaturated_bins, vec![1, 0]);

        for peer in table.peers_to_connect() {
            table.connected(peer);
        }
        let health = table.health(pot);
        assert!(health.is_healthy(), "{health}");
        assert_eq!(health.peers.len(), 6);
    }

    #[test]
    fn test_lone_node_is_healthy() {
        let base = addr_from_byte(0x00);
        let index = PeerPotIndex::build(&[base], 2);
        let table = make_table(2);

        assert!(table.health(index.get(&base).unwrap()).is_healthy());
    }
}
