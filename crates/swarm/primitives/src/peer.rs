//! Node identity and the peer record exchanged between nodes.

use crate::OverlayAddress;
use alloy_primitives::{B256, keccak256};
use core::fmt;
use rand::RngCore;

/// Unique identifier of a simulated node.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(B256);

impl NodeId {
    /// Wrap raw identifier bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Draw a fresh identifier from `rng`.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    /// Overlay address of this node: `keccak256(id)`.
    pub fn overlay(&self) -> OverlayAddress {
        OverlayAddress::from(keccak256(self.0))
    }

    /// Simulated transport endpoint of this node.
    pub fn underlay(&self) -> Underlay {
        Underlay(format!("sim://{}", hex::encode(self.0.as_slice())))
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(self.0.get(..4).unwrap_or_default())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.short())
    }
}

/// Physical (simulated) connection endpoint of a node.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[display("{_0}")]
pub struct Underlay(String);

impl Underlay {
    /// Endpoint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Underlay {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Everything a peer needs to know to reach a node.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerRecord {
    /// Node identifier.
    pub id: NodeId,
    /// Overlay address derived from `id`.
    pub overlay: OverlayAddress,
    /// Transport endpoint derived from `id`.
    pub underlay: Underlay,
}

impl PeerRecord {
    /// Build the record for `id`, deriving its addresses.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            overlay: id.overlay(),
            underlay: id.underlay(),
        }
    }

    /// Whether the addresses in this record are the ones derived from its id.
    pub fn is_consistent(&self) -> bool {
        self.overlay == self.id.overlay() && self.underlay == self.id.underlay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_seeded_ids_are_reproducible() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);

        let ids_a: Vec<_> = (0..4).map(|_| NodeId::random(&mut a)).collect();
        let ids_b: Vec<_> = (0..4).map(|_| NodeId::random(&mut b)).collect();
        assert_eq!(ids_a, ids_b);
        assert_ne!(ids_a[0], ids_a[1]);
    }

    #[test]
    fn test_addresses_are_derived_from_id() {
        let id = NodeId::new([1; 32]);
        let record = PeerRecord::new(id);

        assert_eq!(record.overlay, id.overlay());
        assert_ne!(*record.overlay.as_b256(), B256::new([1; 32]));
        assert!(record.underlay.as_str().starts_with("sim://0101"));
        assert!(record.is_consistent());

        let forged = PeerRecord {
            overlay: NodeId::new([2; 32]).overlay(),
            ..record
        };
        assert!(!forged.is_consistent());
    }
}
