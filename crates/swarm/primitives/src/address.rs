//! Overlay addresses and the proximity order between them.

use alloy_primitives::B256;
use core::{cmp::Ordering, fmt};

/// Maximum proximity order tracked by the topology.
///
/// Addresses sharing more leading bits than this fall into the same
/// (deepest) bin.
pub const MAX_PO: u8 = 31;

/// A node's position in the 256-bit overlay address space.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From, derive_more::Deref,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct OverlayAddress(B256);

impl OverlayAddress {
    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Underlying 32 bytes.
    pub const fn as_b256(&self) -> &B256 {
        &self.0
    }

    /// Proximity order between two addresses.
    ///
    /// The number of leading bits `self` and `other` have in common, i.e. the
    /// count of leading zero bits of `self ^ other`, capped at [`MAX_PO`].
    /// 0 is farthest.
    pub fn proximity(&self, other: &Self) -> u8 {
        for (i, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let x = a ^ b;
            if x != 0 {
                let po = i * 8 + x.leading_zeros() as usize;
                return po.min(MAX_PO as usize) as u8;
            }
        }
        MAX_PO
    }

    /// Compare the XOR distances of `a` and `b` from `self`.
    ///
    /// `Ordering::Less` means `a` is closer to `self` than `b`.
    pub fn distance_cmp(&self, a: &Self, b: &Self) -> Ordering {
        self.0
            .iter()
            .zip(a.0.iter())
            .zip(b.0.iter())
            .map(|((s, a), b)| (s ^ a).cmp(&(s ^ b)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(self.0.get(..4).unwrap_or_default())
    }
}

impl From<[u8; 32]> for OverlayAddress {
    fn from(bytes: [u8; 32]) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Display for OverlayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_slice()))
    }
}

impl fmt::Debug for OverlayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OverlayAddress({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(prefix: &[u8]) -> OverlayAddress {
        let mut bytes = [0u8; 32];
        bytes[..prefix.len()].copy_from_slice(prefix);
        OverlayAddress::new(bytes)
    }

    #[test]
    fn test_proximity() {
        let base = addr(&[]);
        let cases = [
            (vec![0b1000_0000], 0),
            (vec![0b0100_0000], 1),
            (vec![0b0000_0001], 7),
            (vec![0b0000_0000, 0b1000_0000], 8),
            (vec![0b0000_0000, 0b0000_0001], 15),
            (vec![0b0000_0000, 0b0000_0000, 0b0010_0000], 18),
            (vec![0, 0, 0, 0b0000_0001], 31),
            (vec![0, 0, 0, 0, 0b1000_0000], MAX_PO),
            (vec![], MAX_PO),
        ];

        for (prefix, expected) in cases {
            let other = addr(&prefix);
            assert_eq!(base.proximity(&other), expected, "prefix {prefix:?}");
            assert_eq!(other.proximity(&base), expected, "prefix {prefix:?} reversed");
        }
    }

    #[test]
    fn test_distance_cmp() {
        let base = addr(&[0x00]);
        let near = addr(&[0x01]);
        let far = addr(&[0x80]);

        assert_eq!(base.distance_cmp(&near, &far), Ordering::Less);
        assert_eq!(base.distance_cmp(&far, &near), Ordering::Greater);
        assert_eq!(base.distance_cmp(&far, &far), Ordering::Equal);

        // Distance is relative to the base, not the numeric value.
        let base = addr(&[0xff]);
        assert_eq!(base.distance_cmp(&far, &near), Ordering::Less);
    }

    #[test]
    fn test_display_is_full_hex() {
        let a = addr(&[0xab, 0xcd]);
        let shown = a.to_string();
        assert_eq!(shown.len(), 64);
        assert!(shown.starts_with("abcd"));
        assert_eq!(a.short(), "abcd0000");
    }
}
