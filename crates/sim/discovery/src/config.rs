//! Discovery service configuration.

use vertex_swarm_kademlia::KademliaConfig;

/// Configuration for the discovery service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Gossip peers and dial them. When off, the service only tracks the
    /// connections made for it.
    pub enabled: bool,

    /// Kademlia table parameters.
    pub kademlia: KademliaConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kademlia: KademliaConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Turn gossip and dialing on or off.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the minimum bin size.
    pub fn with_min_prox_bin_size(mut self, size: usize) -> Self {
        self.kademlia = self.kademlia.with_min_prox_bin_size(size);
        self
    }
}
