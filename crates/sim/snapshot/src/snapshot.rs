//! Snapshot document and codec.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use vertex_sim_network::{Connection, Network, NetworkBuilder, NetworkError, NodeSpec};
use vertex_swarm_primitives::{NodeId, OverlayAddress, PeerRecord, Underlay};

use crate::{Discrepancy, ReconstructError, ServiceFilter, SnapshotError};

/// Schema version written and read by this codec.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One captured node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node identifier.
    pub id: NodeId,
    /// Overlay address.
    pub address: OverlayAddress,
    /// Transport endpoint.
    pub underlay: Underlay,
    /// Captured state per service; `null` starts the service fresh.
    #[serde(default)]
    pub services: BTreeMap<String, Value>,
}

impl NodeSnapshot {
    /// Whether the captured addresses are the ones derived from the id.
    pub fn is_consistent(&self) -> bool {
        let record = PeerRecord::new(self.id);
        record.overlay == self.address && record.underlay == self.underlay
    }

    fn spec(&self) -> NodeSpec {
        NodeSpec {
            id: self.id,
            services: self
                .services
                .iter()
                .map(|(name, state)| {
                    let state = (!state.is_null()).then(|| state.clone());
                    (name.clone(), state)
                })
                .collect(),
        }
    }
}

/// One captured connection. `a` dialled `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnSnapshot {
    /// Dialling node.
    pub a: NodeId,
    /// Dialled node.
    pub b: NodeId,
    /// Whether the link was up.
    pub up: bool,
}

impl ConnSnapshot {
    /// Unordered identity of the link.
    pub fn key(&self) -> (NodeId, NodeId) {
        if self.a <= self.b { (self.a, self.b) } else { (self.b, self.a) }
    }
}

impl From<Connection> for ConnSnapshot {
    fn from(conn: Connection) -> Self {
        Self {
            a: conn.a,
            b: conn.b,
            up: conn.up,
        }
    }
}

/// Captured state of a whole network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version.
    pub version: u32,
    /// Nodes in creation order.
    pub nodes: Vec<NodeSnapshot>,
    /// Connections sorted by unordered pair.
    pub conns: Vec<ConnSnapshot>,
}

impl Snapshot {
    /// Capture `network`, passing each node's services through `filter`.
    ///
    /// Output order depends only on the network: nodes in creation order,
    /// connections sorted by unordered pair.
    pub async fn capture(network: &Network, filter: &ServiceFilter) -> Result<Self, SnapshotError> {
        let mut nodes = Vec::with_capacity(network.len());
        for node in network.nodes() {
            let mut services = node.capture().await.map_err(|source| SnapshotError::Capture {
                node: node.id(),
                source,
            })?;
            filter.apply(&mut services);

            let record = node.record();
            nodes.push(NodeSnapshot {
                id: record.id,
                address: record.overlay,
                underlay: record.underlay.clone(),
                services,
            });
        }

        let mut conns: Vec<ConnSnapshot> = network.conns().into_iter().map(Into::into).collect();
        conns.sort_by_key(ConnSnapshot::key);

        info!(nodes = nodes.len(), conns = conns.len(), "captured snapshot");
        Ok(Self {
            version: SNAPSHOT_VERSION,
            nodes,
            conns,
        })
    }

    /// Pretty-printed JSON encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec_pretty(self).map_err(SnapshotError::Encode)
    }

    /// Decode a document. Touches no network.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_slice(bytes).map_err(SnapshotError::Decode)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Rebuild the captured network with `builder`.
    ///
    /// Nodes restart with their captured service states; every connection
    /// that was up is re-established. Health is not checked. On failure
    /// nothing is left running.
    pub async fn load(&self, builder: &NetworkBuilder) -> Result<Network, SnapshotError> {
        if let Some(node) = self.nodes.iter().find(|node| !node.is_consistent()) {
            return Err(SnapshotError::Reconstruct {
                node: node.id,
                source: ReconstructError::AddressMismatch,
            });
        }

        let specs = self.nodes.iter().map(NodeSnapshot::spec).collect();
        let network = builder
            .build(specs)
            .map_err(|error| match self.failing_node(&error) {
                Some(node) => SnapshotError::Reconstruct {
                    node,
                    source: error.into(),
                },
                None => error.into(),
            })?;

        for conn in self.conns.iter().filter(|conn| conn.up) {
            match network.connect(&conn.a, &conn.b) {
                Ok(()) | Err(NetworkError::AlreadyConnected { .. }) => {}
                Err(source) => {
                    network.shutdown().await;
                    return Err(SnapshotError::Connection {
                        a: conn.a,
                        b: conn.b,
                        source,
                    });
                }
            }
        }

        info!(
            nodes = self.nodes.len(),
            conns = self.conns.iter().filter(|conn| conn.up).count(),
            "loaded snapshot"
        );
        Ok(network)
    }

    /// Node a construction error is about, if any.
    fn failing_node(&self, error: &NetworkError) -> Option<NodeId> {
        match error {
            NetworkError::Service { node, .. } | NetworkError::DuplicateNode(node) => Some(*node),
            NetworkError::UnknownService(name) => self
                .nodes
                .iter()
                .find(|node| node.services.contains_key(name))
                .map(|node| node.id),
            _ => None,
        }
    }

    /// Check that `network` holds every captured node, with the same
    /// addresses, and every captured up connection.
    pub fn verify_against(&self, network: &Network) -> Result<(), SnapshotError> {
        for captured in &self.nodes {
            let node = network
                .node(&captured.id)
                .ok_or(Discrepancy::MissingNode(captured.id))?;
            if node.overlay() != captured.address || node.record().underlay != captured.underlay {
                return Err(Discrepancy::AddressChanged(captured.id).into());
            }
        }
        for conn in self.conns.iter().filter(|conn| conn.up) {
            if !network.is_connected(&conn.a, &conn.b) {
                return Err(Discrepancy::MissingConnection {
                    a: conn.a,
                    b: conn.b,
                }
                .into());
            }
        }
        debug!(nodes = self.nodes.len(), "network matches snapshot");
        Ok(())
    }

    /// Node identifiers in capture order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    /// Unordered pairs of every up connection.
    pub fn up_links(&self) -> BTreeSet<(NodeId, NodeId)> {
        self.conns
            .iter()
            .filter(|conn| conn.up)
            .map(ConnSnapshot::key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_document_shape() {
        let id = NodeId::new([1; 32]);
        let record = PeerRecord::new(id);
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            nodes: vec![NodeSnapshot {
                id,
                address: record.overlay,
                underlay: record.underlay.clone(),
                services: BTreeMap::from([("discovery".to_string(), Value::Null)]),
            }],
            conns: vec![],
        };

        let value: Value = serde_json::from_slice(&snapshot.to_bytes().unwrap()).unwrap();
        assert_eq!(value["version"], json!(1));
        assert_eq!(value["nodes"][0]["id"], json!(format!("0x{}", "01".repeat(32))));
        assert_eq!(value["nodes"][0]["underlay"], json!(record.underlay.as_str()));
        assert_eq!(value["nodes"][0]["services"]["discovery"], Value::Null);
        assert_eq!(value["conns"], json!([]));
    }

    #[test]
    fn test_decode_errors() {
        assert_matches!(Snapshot::from_bytes(b"{"), Err(SnapshotError::Decode(_)));
        assert_matches!(
            Snapshot::from_bytes(br#"{"nodes": []}"#),
            Err(SnapshotError::Decode(_))
        );
        assert_matches!(
            Snapshot::from_bytes(br#"{"version": 2, "nodes": [], "conns": []}"#),
            Err(SnapshotError::UnsupportedVersion { found: 2, supported: 1 })
        );
    }

    #[test]
    fn test_null_state_starts_fresh() {
        let id = NodeId::new([2; 32]);
        let record = PeerRecord::new(id);
        let node = NodeSnapshot {
            id,
            address: record.overlay,
            underlay: record.underlay,
            services: BTreeMap::from([
                ("a".to_string(), Value::Null),
                ("b".to_string(), json!({ "x": 1 })),
            ]),
        };

        let spec = node.spec();
        assert_eq!(spec.services["a"], None);
        assert_eq!(spec.services["b"], Some(json!({ "x": 1 })));
    }

    #[test]
    fn test_conn_key_is_unordered() {
        let a = NodeId::new([9; 32]);
        let b = NodeId::new([1; 32]);
        let conn = ConnSnapshot { a, b, up: true };
        assert_eq!(conn.key(), (b, a));
    }
}
