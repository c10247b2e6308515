//! Capture, encode, decode and reload of simulated networks.

use std::time::Duration;

use assert_matches::assert_matches;
use rand::{SeedableRng, rngs::StdRng};
use serde_json::Value;
use vertex_sim_discovery::{DiscoveryConfig, SERVICE_NAME, factory};
use vertex_sim_network::{
    Network, NetworkBuilder, NetworkError, ServiceRegistry, Topology,
};
use vertex_sim_snapshot::{
    Discrepancy, ReconstructError, ServiceFilter, Snapshot, SnapshotError,
};
use vertex_swarm_primitives::NodeId;

fn builder() -> NetworkBuilder {
    NetworkBuilder::new(ServiceRegistry::new().with(
        SERVICE_NAME,
        factory(DiscoveryConfig::default().with_enabled(false)),
    ))
}

async fn ring(count: usize, seed: u64) -> Network {
    let mut rng = StdRng::seed_from_u64(seed);
    let network = builder()
        .create_nodes(count, &[SERVICE_NAME.to_string()], &mut rng)
        .unwrap();
    network.connect_topology(Topology::Ring, 0).unwrap();
    // Let every node record its links before capturing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    network
}

#[tokio::test(flavor = "multi_thread")]
async fn test_roundtrip_restores_nodes_and_links() {
    let network = ring(5, 1).await;
    let snapshot = Snapshot::capture(&network, &ServiceFilter::default())
        .await
        .unwrap();
    assert_eq!(snapshot.nodes.len(), 5);
    assert_eq!(snapshot.up_links().len(), 5);

    let bytes = snapshot.to_bytes().unwrap();
    let decoded = Snapshot::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, snapshot);

    let loaded = decoded.load(&builder()).await.unwrap();
    decoded.verify_against(&loaded).unwrap();
    assert_eq!(decoded.node_ids(), network.ids());
    assert_eq!(loaded.ids(), decoded.node_ids());
    assert_eq!(
        loaded.conns().iter().map(|conn| conn.key()).collect::<Vec<_>>(),
        network.conns().iter().map(|conn| conn.key()).collect::<Vec<_>>()
    );

    // Service state survives the reload.
    let recaptured = Snapshot::capture(&loaded, &ServiceFilter::default())
        .await
        .unwrap();
    assert_eq!(recaptured, snapshot);
    assert_eq!(recaptured.to_bytes().unwrap(), bytes);

    loaded.shutdown().await;
    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_capture_applies_filter() {
    let network = ring(3, 2).await;
    let filter: ServiceFilter = "+extra,-discovery".parse().unwrap();
    let snapshot = Snapshot::capture(&network, &filter).await.unwrap();

    for node in &snapshot.nodes {
        assert!(!node.services.contains_key(SERVICE_NAME));
        assert_eq!(node.services["extra"], Value::Null);
    }

    // The added service is unknown to this registry.
    assert_matches!(
        snapshot.load(&builder()).await,
        Err(SnapshotError::Reconstruct {
            source: ReconstructError::Network(NetworkError::UnknownService(name)),
            ..
        }) if name == "extra"
    );

    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_load_rejects_tampered_address() {
    let network = ring(3, 3).await;
    let mut snapshot = Snapshot::capture(&network, &ServiceFilter::default())
        .await
        .unwrap();
    let victim = snapshot.nodes[1].id;
    snapshot.nodes[1].address = snapshot.nodes[0].address;

    assert_matches!(
        snapshot.load(&builder()).await,
        Err(SnapshotError::Reconstruct { node, source: ReconstructError::AddressMismatch })
            if node == victim
    );

    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_load_rejects_link_to_unknown_node() {
    let network = ring(3, 4).await;
    let mut snapshot = Snapshot::capture(&network, &ServiceFilter::default())
        .await
        .unwrap();
    let stranger = NodeId::new([0xee; 32]);
    let mut conn = snapshot.conns[0];
    conn.b = stranger;
    snapshot.conns.push(conn);

    assert_matches!(
        snapshot.load(&builder()).await,
        Err(SnapshotError::Connection { b, source: NetworkError::UnknownNode(_), .. })
            if b == stranger
    );

    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_verify_detects_missing_link() {
    let network = ring(4, 5).await;
    let snapshot = Snapshot::capture(&network, &ServiceFilter::default())
        .await
        .unwrap();

    let loaded = snapshot.load(&builder()).await.unwrap();
    let dropped = snapshot.conns[0];
    loaded.disconnect(&dropped.a, &dropped.b).unwrap();

    assert_matches!(
        snapshot.verify_against(&loaded),
        Err(SnapshotError::Mismatch(Discrepancy::MissingConnection { .. }))
    );

    loaded.shutdown().await;
    network.shutdown().await;
}
