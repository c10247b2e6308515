//! The discovery service.
//!
//! # Flow
//!
//! 1. On connect, the new peer receives every record we know, and every
//!    other connected peer hears about the new one.
//! 2. Received records that are new to us are stored and forwarded to the
//!    other connected peers; known ones are dropped, so flooding ends.
//! 3. After learning or connecting, and on every tick, the kademlia table
//!    picks peers to dial: all known neighbours at or above the depth, and
//!    enough peers in each shallower bin.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};
use vertex_sim_network::{
    NetworkError, NodeService, RpcError, RpcRequest, RpcResponse, ServiceContext, ServiceError,
};
use vertex_swarm_kademlia::KademliaTable;
use vertex_swarm_primitives::{NodeId, OverlayAddress, PeerRecord};

use crate::{DiscoveryConfig, protocol::HiveMessage};

/// Captured state of a discovery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryState {
    /// Whether gossip and dialing were on.
    pub enabled: bool,
    /// Bin size of the kademlia table.
    pub min_prox_bin_size: usize,
    /// Address book, in overlay order.
    pub known: Vec<PeerRecord>,
}

/// Peer discovery for one simulated node.
#[derive(Debug)]
pub struct DiscoveryService {
    local: PeerRecord,
    enabled: bool,
    table: KademliaTable,
    /// Every valid record learned, by overlay.
    book: BTreeMap<OverlayAddress, PeerRecord>,
    /// Connected peers.
    connected: BTreeMap<NodeId, PeerRecord>,
    /// Table changed since it was last logged.
    dirty: bool,
}

impl DiscoveryService {
    /// Create the service for `local`, restoring `state` when given.
    ///
    /// Restored state overrides `enabled` and the bin size of `config`.
    pub fn new(
        local: PeerRecord,
        mut config: DiscoveryConfig,
        state: Option<&Value>,
    ) -> Result<Self, ServiceError> {
        let state = match state {
            Some(Value::Null) | None => None,
            Some(value) => Some(DiscoveryState::deserialize(value)?),
        };
        if let Some(state) = &state {
            config.enabled = state.enabled;
            config.kademlia.min_prox_bin_size = state.min_prox_bin_size;
        }

        let mut service = Self {
            table: KademliaTable::new(local.overlay, config.kademlia),
            local,
            enabled: config.enabled,
            book: BTreeMap::new(),
            connected: BTreeMap::new(),
            dirty: false,
        };
        if let Some(state) = state {
            let restored = service.learn(state.known);
            debug!(node = %service.local.id, restored = restored.len(), "restored address book");
        }
        Ok(service)
    }

    /// Kademlia table of this node.
    pub fn table(&self) -> &KademliaTable {
        &self.table
    }

    /// Current state, as captured in snapshots.
    pub fn state(&self) -> DiscoveryState {
        DiscoveryState {
            enabled: self.enabled,
            min_prox_bin_size: self.table.config().min_prox_bin_size,
            known: self.book.values().cloned().collect(),
        }
    }

    /// Store records new to us. Returns the new ones.
    fn learn(&mut self, records: Vec<PeerRecord>) -> Vec<PeerRecord> {
        let mut fresh = Vec::new();
        for record in records {
            if record.id == self.local.id || !record.is_consistent() {
                continue;
            }
            if self.book.contains_key(&record.overlay) {
                continue;
            }
            self.book.insert(record.overlay, record.clone());
            fresh.push(record);
        }

        let overlays: Vec<_> = fresh.iter().map(|record| record.overlay).collect();
        if self.table.add_peers(&overlays) > 0 {
            self.dirty = true;
        }
        fresh
    }

    /// Send `records` to `peer` in batches.
    fn gossip(&self, ctx: &ServiceContext, peer: &NodeId, records: &[PeerRecord]) {
        for message in HiveMessage::batches(records) {
            let result = message
                .encode()
                .and_then(|payload| ctx.send(peer, payload).map_err(ServiceError::from));
            if let Err(error) = result {
                trace!(node = %self.local.id, %peer, %error, "gossip not delivered");
                return;
            }
        }
    }

    /// Dial whatever the table asks for.
    fn manage(&mut self, ctx: &ServiceContext) {
        if !self.enabled {
            return;
        }
        for overlay in self.table.peers_to_connect() {
            let Some(record) = self.book.get(&overlay) else {
                continue;
            };
            self.table.start_connecting(overlay);
            match ctx.dial(&record.id) {
                // The peer dialled us first; its connection is on its way.
                Ok(()) | Err(NetworkError::AlreadyConnected { .. }) => {}
                Err(error) => {
                    debug!(node = %self.local.id, peer = %record.id, %error, "dial failed");
                    self.table.connection_failed(&overlay);
                }
            }
        }
    }
}

impl NodeService for DiscoveryService {
    fn on_start(&mut self, ctx: &ServiceContext) {
        self.manage(ctx);
    }

    fn on_peer_connected(&mut self, ctx: &ServiceContext, peer: &PeerRecord) {
        self.learn(vec![peer.clone()]);
        self.table.connected(peer.overlay);
        self.connected.insert(peer.id, peer.clone());
        self.dirty = true;

        if !self.enabled {
            return;
        }

        let known: Vec<_> = self
            .book
            .values()
            .filter(|record| record.id != peer.id)
            .cloned()
            .collect();
        self.gossip(ctx, &peer.id, &known);

        let announcement = [peer.clone()];
        for other in self.connected.keys().filter(|id| **id != peer.id) {
            self.gossip(ctx, other, &announcement);
        }

        self.manage(ctx);
    }

    fn on_peer_disconnected(&mut self, _ctx: &ServiceContext, peer: &PeerRecord) {
        self.connected.remove(&peer.id);
        self.table.disconnected(&peer.overlay);
        self.dirty = true;
    }

    fn on_message(
        &mut self,
        ctx: &ServiceContext,
        from: &PeerRecord,
        payload: Bytes,
    ) -> Result<(), ServiceError> {
        let HiveMessage::Peers { peers } = HiveMessage::decode(&from.id, &payload)?;
        let received = peers.len();
        let fresh = self.learn(peers);
        trace!(
            node = %self.local.id,
            from = %from.id,
            received,
            fresh = fresh.len(),
            "peers received"
        );

        if !self.enabled || fresh.is_empty() {
            return Ok(());
        }
        for other in self.connected.keys().filter(|id| **id != from.id) {
            self.gossip(ctx, other, &fresh);
        }
        self.manage(ctx);
        Ok(())
    }

    fn on_tick(&mut self, ctx: &ServiceContext) {
        self.manage(ctx);
        if self.dirty {
            self.table.log_status();
            self.dirty = false;
        }
    }

    fn on_rpc(&mut self, request: &RpcRequest) -> Option<Result<RpcResponse, RpcError>> {
        match request {
            RpcRequest::Healthy(pot) => Some(Ok(RpcResponse::Healthy(self.table.health(pot)))),
            _ => None,
        }
    }

    fn snapshot(&self) -> Value {
        match serde_json::to_value(self.state()) {
            Ok(value) => value,
            Err(error) => {
                warn!(node = %self.local.id, %error, "failed to capture discovery state");
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn record(b: u8) -> PeerRecord {
        PeerRecord::new(NodeId::new([b; 32]))
    }

    #[test]
    fn test_learn_filters_self_duplicates_and_forgeries() {
        let local = record(0);
        let mut service = DiscoveryService::new(local.clone(), DiscoveryConfig::default(), None).unwrap();

        let forged = PeerRecord {
            overlay: record(3).overlay,
            ..record(2)
        };
        let fresh = service.learn(vec![local, record(1), record(1), forged]);
        assert_eq!(fresh, vec![record(1)]);
        assert!(service.learn(vec![record(1)]).is_empty());
        assert!(service.table().knows(&record(1).overlay));
    }

    #[test]
    fn test_state_restores_address_book() {
        let config = DiscoveryConfig::default();
        let mut original = DiscoveryService::new(record(0), config.clone(), None).unwrap();
        original.learn(vec![record(1), record(2)]);

        let captured = original.snapshot();
        let restored = DiscoveryService::new(record(0), config.with_enabled(true), Some(&captured))
            .unwrap();
        assert_eq!(restored.state(), original.state());
        assert_eq!(restored.state().known.len(), 2);
    }

    #[test]
    fn test_state_overrides_config() {
        let state = json!({ "enabled": false, "min_prox_bin_size": 3, "known": [] });
        let service = DiscoveryService::new(record(0), DiscoveryConfig::default(), Some(&state)).unwrap();

        assert!(!service.state().enabled);
        assert_eq!(service.table().config().min_prox_bin_size, 3);
    }

    #[test]
    fn test_null_state_starts_fresh() {
        let service =
            DiscoveryService::new(record(0), DiscoveryConfig::default(), Some(&Value::Null)).unwrap();
        assert!(service.state().known.is_empty());
    }

    #[test]
    fn test_invalid_state_is_rejected() {
        let state = json!({ "enabled": "yes" });
        assert_matches!(
            DiscoveryService::new(record(0), DiscoveryConfig::default(), Some(&state)),
            Err(ServiceError::InvalidState(_))
        );
    }
}
