//! Nearest-neighbour oracle.
//!
//! Given the complete set of overlay addresses in a network, a [`PeerPot`]
//! records which peers a node *should* end up knowing and connected to once
//! discovery has finished: its nearest-neighbour set, plus how many peers it
//! should hold in each shallower bin. Live tables are measured against it by
//! [`KademliaTable::health`](crate::KademliaTable::health).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vertex_swarm_primitives::OverlayAddress;

/// Expected population of one bin shallower than the neighbourhood depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinTarget {
    /// Proximity order of the bin.
    pub po: u8,
    /// Peers the whole network has in this bin.
    pub available: usize,
    /// Connected peers required for the bin to count as saturated.
    pub expected: usize,
}

/// Ideal neighbourhood of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPot {
    /// Neighbourhood depth: peers at or above this proximity order are
    /// nearest neighbours.
    pub depth: u8,
    /// Bin size the pot was computed with.
    pub min_prox_bin_size: usize,
    /// Nearest neighbours, closest first.
    pub nearest: Vec<OverlayAddress>,
    /// Populated bins shallower than `depth`, deepest first.
    pub bins: Vec<BinTarget>,
}

impl PeerPot {
    /// Compute the pot of `base` among `addresses`.
    ///
    /// `base` itself and duplicates in `addresses` are ignored.
    pub fn compute<'a>(
        base: &OverlayAddress,
        addresses: impl IntoIterator<Item = &'a OverlayAddress>,
        min_prox_bin_size: usize,
    ) -> Self {
        let peers = sorted_by_distance(base, addresses);
        let depth = depth_of_sorted(base, &peers, min_prox_bin_size);

        let mut nearest = Vec::new();
        let mut available: BTreeMap<u8, usize> = BTreeMap::new();
        for peer in peers {
            let po = base.proximity(&peer);
            if po >= depth {
                nearest.push(peer);
            } else {
                *available.entry(po).or_default() += 1;
            }
        }

        let bins = available
            .into_iter()
            .rev()
            .map(|(po, available)| BinTarget {
                po,
                available,
                expected: available.min(min_prox_bin_size),
            })
            .collect();

        Self {
            depth,
            min_prox_bin_size,
            nearest,
            bins,
        }
    }
}

/// Neighbourhood depth of `base` among `peers`.
///
/// The depth is the proximity order of the `min_prox_bin_size`-th closest
/// peer, so the nearest-neighbour set (every peer at or above the depth)
/// holds at least that many peers and always ends on a complete bin. With
/// fewer peers than that, every peer is a neighbour and the depth is 0.
pub fn neighbourhood_depth<'a>(
    base: &OverlayAddress,
    peers: impl IntoIterator<Item = &'a OverlayAddress>,
    min_prox_bin_size: usize,
) -> u8 {
    let sorted = sorted_by_distance(base, peers);
    depth_of_sorted(base, &sorted, min_prox_bin_size)
}

fn sorted_by_distance<'a>(
    base: &OverlayAddress,
    addresses: impl IntoIterator<Item = &'a OverlayAddress>,
) -> Vec<OverlayAddress> {
    let mut peers: Vec<OverlayAddress> = addresses
        .into_iter()
        .filter(|addr| *addr != base)
        .copied()
        .collect();
    peers.sort_by(|a, b| base.distance_cmp(a, b));
    peers.dedup();
    peers
}

fn depth_of_sorted(base: &OverlayAddress, sorted: &[OverlayAddress], min: usize) -> u8 {
    sorted
        .get(min.max(1) - 1)
        .map(|peer| base.proximity(peer))
        .unwrap_or(0)
}

/// Peer pots for every node of a network, keyed by overlay address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerPotIndex {
    min_prox_bin_size: usize,
    pots: BTreeMap<OverlayAddress, PeerPot>,
}

impl PeerPotIndex {
    /// Build the pots of every address in `addresses`.
    ///
    /// Pure: the same address set and bin size always give the same index,
    /// whatever the order of `addresses`.
    pub fn build(addresses: &[OverlayAddress], min_prox_bin_size: usize) -> Self {
        let mut unique = addresses.to_vec();
        unique.sort();
        unique.dedup();

        let pots: BTreeMap<_, _> = unique
            .iter()
            .map(|base| (*base, PeerPot::compute(base, &unique, min_prox_bin_size)))
            .collect();

        debug!(
            nodes = pots.len(),
            min_prox_bin_size, "built peer pot index"
        );

        Self {
            min_prox_bin_size,
            pots,
        }
    }

    /// Pot of the node at `address`.
    pub fn get(&self, address: &OverlayAddress) -> Option<&PeerPot> {
        self.pots.get(address)
    }

    /// Iterate over all pots in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&OverlayAddress, &PeerPot)> {
        self.pots.iter()
    }

    /// Number of nodes covered.
    pub fn len(&self) -> usize {
        self.pots.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.pots.is_empty()
    }

    /// Bin size the index was built with.
    pub fn min_prox_bin_size(&self) -> usize {
        self.min_prox_bin_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(first: u8) -> OverlayAddress {
        let mut bytes = [0u8; 32];
        bytes[0] = first;
        OverlayAddress::from(bytes)
    }

    fn network() -> Vec<OverlayAddress> {
        // Relative to 0x00: 0x10 is PO 3, 0x20/0x30 PO 2, 0x40 PO 1, 0x80/0xc0 PO 0.
        [0x00, 0xc0, 0x20, 0x80, 0x10, 0x40, 0x30]
            .into_iter()
            .map(addr)
            .collect()
    }

    #[test]
    fn test_nearest_set_completes_the_bin() {
        let index = PeerPotIndex::build(&network(), 2);
        let pot = index.get(&addr(0x00)).unwrap();

        // The second closest peer (0x20) sits in bin 2; 0x30 shares that bin.
        assert_eq!(pot.depth, 2);
        assert_eq!(pot.nearest, vec![addr(0x10), addr(0x20), addr(0x30)]);
        assert_eq!(
            pot.bins,
            vec![
                BinTarget { po: 1, available: 1, expected: 1 },
                BinTarget { po: 0, available: 2, expected: 2 },
            ]
        );
    }

    #[test]
    fn test_single_peer_bins() {
        let pot = PeerPot::compute(&addr(0x00), &network(), 1);

        assert_eq!(pot.depth, 3);
        assert_eq!(pot.nearest, vec![addr(0x10)]);
        assert!(pot.bins.iter().all(|bin| bin.expected == 1));
        assert_eq!(pot.bins.len(), 3);
    }

    #[test]
    fn test_small_network_is_all_neighbours() {
        let pot = PeerPot::compute(&addr(0x00), &network(), 10);

        assert_eq!(pot.depth, 0);
        assert_eq!(pot.nearest.len(), 6);
        assert!(pot.bins.is_empty());
    }

    #[test]
    fn test_lone_node_has_empty_pot() {
        let index = PeerPotIndex::build(&[addr(0x42)], 2);
        let pot = index.get(&addr(0x42)).unwrap();

        assert!(pot.nearest.is_empty());
        assert!(pot.bins.is_empty());
    }

    #[test]
    fn test_depth_matches_pot() {
        let all = network();
        for base in &all {
            let pot = PeerPot::compute(base, &all, 2);
            assert_eq!(neighbourhood_depth(base, &all, 2), pot.depth);
        }
    }

    proptest! {
        #[test]
        fn prop_index_is_deterministic(
            raw in prop::collection::vec(any::<[u8; 32]>(), 1..40),
            min in 1usize..5,
        ) {
            let addresses: Vec<OverlayAddress> = raw.into_iter().map(OverlayAddress::from).collect();
            let mut reversed = addresses.clone();
            reversed.reverse();

            let first = PeerPotIndex::build(&addresses, min);
            let second = PeerPotIndex::build(&addresses, min);
            let shuffled = PeerPotIndex::build(&reversed, min);

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&first, &shuffled);
        }

        #[test]
        fn prop_nearest_set_is_large_enough(
            raw in prop::collection::vec(any::<[u8; 32]>(), 2..40),
            min in 1usize..5,
        ) {
            let addresses: Vec<OverlayAddress> = raw.into_iter().map(OverlayAddress::from).collect();
            let index = PeerPotIndex::build(&addresses, min);
            let peers = index.len() - 1;

            for (base, pot) in index.iter() {
                prop_assert!(pot.nearest.len() >= min.min(peers));
                prop_assert!(pot.nearest.iter().all(|p| base.proximity(p) >= pot.depth));
                prop_assert!(pot.bins.iter().all(|b| b.po < pot.depth && b.expected >= 1));
            }
        }
    }
}
