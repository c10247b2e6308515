//! Proximity-ordered peer storage (PSlice).
//!
//! Peers are organized into bins based on their proximity order (PO) to a
//! base address. The base address is not stored here; callers provide the PO
//! when adding peers.
//!
//! # Implementation
//!
//! A `BTreeMap<OverlayAddress, u8>` keeps iteration order independent of
//! insertion order, so anything derived from a slice (gossip batches,
//! captured service state) is reproducible. Per-bin counters make size
//! queries O(1).

use std::collections::BTreeMap;

use vertex_swarm_primitives::{MAX_PO, OverlayAddress};

/// Number of bins (one for each possible PO value `0..=MAX_PO`).
pub const NUM_BINS: usize = MAX_PO as usize + 1;

/// Proximity-ordered peer storage.
#[derive(Debug, Clone, Default)]
pub struct PSlice {
    /// Maps peer address to its proximity order.
    peers: BTreeMap<OverlayAddress, u8>,
    /// Counters per bin.
    bin_counts: [usize; NUM_BINS],
}

impl PSlice {
    /// Create a new empty PSlice.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer with its proximity order.
    ///
    /// Returns `true` if the peer was added (not already present).
    pub fn add(&mut self, peer: OverlayAddress, po: u8) -> bool {
        let po = po.min(MAX_PO);
        if self.peers.contains_key(&peer) {
            return false;
        }

        self.peers.insert(peer, po);
        if let Some(count) = self.bin_counts.get_mut(po as usize) {
            *count += 1;
        }
        true
    }

    /// Remove a peer.
    ///
    /// Returns `true` if the peer was present and removed.
    pub fn remove(&mut self, peer: &OverlayAddress) -> bool {
        match self.peers.remove(peer) {
            Some(po) => {
                if let Some(count) = self.bin_counts.get_mut(po as usize) {
                    *count = count.saturating_sub(1);
                }
                true
            }
            None => false,
        }
    }

    /// Check if a peer exists in the PSlice.
    pub fn exists(&self, peer: &OverlayAddress) -> bool {
        self.peers.contains_key(peer)
    }

    /// Get the proximity order of a peer, if present.
    pub fn get_po(&self, peer: &OverlayAddress) -> Option<u8> {
        self.peers.get(peer).copied()
    }

    /// Get the number of peers in a specific bin.
    pub fn bin_size(&self, po: u8) -> usize {
        self.bin_counts.get(po as usize).copied().unwrap_or(0)
    }

    /// Get the total number of peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Get all peers in a specific bin, in address order.
    pub fn peers_in_bin(&self, po: u8) -> Vec<OverlayAddress> {
        self.peers
            .iter()
            .filter(|&(_, &p)| p == po)
            .map(|(&addr, _)| addr)
            .collect()
    }

    /// Iterate over all peers with their proximity order, from deepest to shallowest.
    ///
    /// Peers within one bin are yielded in address order.
    pub fn iter_by_proximity_desc(&self) -> impl Iterator<Item = (u8, OverlayAddress)> + '_ {
        (0..=MAX_PO)
            .rev()
            .flat_map(move |po| self.peers_in_bin(po).into_iter().map(move |peer| (po, peer)))
    }

    /// Iterate over all peers in address order.
    pub fn iter(&self) -> impl Iterator<Item = &OverlayAddress> {
        self.peers.keys()
    }

    /// Get bin sizes as an array.
    pub fn bin_sizes(&self) -> [usize; NUM_BINS] {
        self.bin_counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pslice_add_remove() {
        let mut pslice = PSlice::new();

        let peer1 = OverlayAddress::from([0x80; 32]);
        let peer2 = OverlayAddress::from([0x40; 32]);

        assert!(pslice.add(peer1, 0));
        assert!(!pslice.add(peer1, 0)); // Already exists
        assert!(pslice.add(peer2, 1));
        assert_eq!(pslice.len(), 2);

        assert!(pslice.remove(&peer1));
        assert!(!pslice.remove(&peer1)); // Already removed

        assert_eq!(pslice.len(), 1);
        assert_eq!(pslice.bin_size(0), 0);
        assert!(!pslice.exists(&peer1));
        assert_eq!(pslice.get_po(&peer2), Some(1));
    }

    #[test]
    fn test_pslice_bins() {
        let mut pslice = PSlice::new();

        let peer1 = OverlayAddress::from([0x80; 32]);
        let peer2 = OverlayAddress::from([0xc0; 32]);
        let peer3 = OverlayAddress::from([0x40; 32]);

        pslice.add(peer2, 0);
        pslice.add(peer3, 1);
        pslice.add(peer1, 0);

        assert_eq!(pslice.bin_size(0), 2);
        assert_eq!(pslice.bin_size(1), 1);
        assert_eq!(pslice.bin_size(2), 0);
        assert_eq!(pslice.bin_sizes()[0], 2);

        // Bins are returned in address order regardless of insertion order.
        assert_eq!(pslice.peers_in_bin(0), vec![peer1, peer2]);
    }

    #[test]
    fn test_pslice_iter_by_proximity_desc() {
        let mut pslice = PSlice::new();

        let peer0 = OverlayAddress::from([0x80; 32]);
        let peer1 = OverlayAddress::from([0x40; 32]);
        let peer2 = OverlayAddress::from([0x20; 32]);

        pslice.add(peer0, 0);
        pslice.add(peer2, 2);
        pslice.add(peer1, 1);

        let collected: Vec<_> = pslice.iter_by_proximity_desc().collect();
        assert_eq!(collected, vec![(2, peer2), (1, peer1), (0, peer0)]);
    }

    #[test]
    fn test_pslice_caps_proximity() {
        let mut pslice = PSlice::new();
        let peer = OverlayAddress::from([0x01; 32]);

        pslice.add(peer, 200);
        assert_eq!(pslice.get_po(&peer), Some(MAX_PO));
        assert_eq!(pslice.bin_size(MAX_PO), 1);
    }
}
