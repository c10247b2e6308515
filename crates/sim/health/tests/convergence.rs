//! Convergence of discovery-driven networks.

use std::time::Duration;

use assert_matches::assert_matches;
use rand::{SeedableRng, rngs::StdRng};
use vertex_sim_discovery::{DiscoveryConfig, SERVICE_NAME, factory};
use vertex_sim_health::{HealthConfig, HealthError, HealthMonitor, MonitorState};
use vertex_sim_network::{
    NetworkBuilder, NodeService, NodeSpec, RpcError, RpcRequest, RpcResponse, ServiceRegistry,
    Topology, factory_fn,
};
use vertex_swarm_kademlia::{KademliaConfig, KademliaTable, PeerPotIndex};
use vertex_swarm_primitives::NodeId;

/// Answers health queries but never learns about or dials anyone.
struct Stubborn {
    table: KademliaTable,
}

impl NodeService for Stubborn {
    fn on_rpc(&mut self, request: &RpcRequest) -> Option<Result<RpcResponse, RpcError>> {
        match request {
            RpcRequest::Healthy(pot) => Some(Ok(RpcResponse::Healthy(self.table.health(pot)))),
            _ => None,
        }
    }
}

fn registry(min_prox_bin_size: usize) -> ServiceRegistry {
    ServiceRegistry::new()
        .with(
            SERVICE_NAME,
            factory(DiscoveryConfig::default().with_min_prox_bin_size(min_prox_bin_size)),
        )
        .with(
            "stubborn",
            factory_fn(|local, _state| {
                Ok(Box::new(Stubborn {
                    table: KademliaTable::new(local.overlay, KademliaConfig::default()),
                }))
            }),
        )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ring_of_ten_converges() {
    init_tracing();

    let mut rng = StdRng::seed_from_u64(42);
    let mut network = NetworkBuilder::new(registry(2))
        .create_nodes(10, &[SERVICE_NAME.to_string()], &mut rng)
        .unwrap();
    network
        .assert_quiescent(Duration::from_millis(100))
        .await
        .unwrap();

    let index = PeerPotIndex::build(&network.overlays(), 2);
    assert_eq!(network.connect_topology(Topology::Ring, 0).unwrap(), 10);

    let mut monitor = HealthMonitor::new(&network, &index, HealthConfig::default());
    assert_eq!(monitor.state(), MonitorState::Idle);
    let convergence = monitor.wait().await.unwrap();

    assert_eq!(monitor.state(), MonitorState::Converged);
    assert!(convergence.elapsed < Duration::from_secs(30));
    // One reading per node at least, plus the confirmation pass.
    assert!(convergence.rounds > 10);

    network.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stubborn_node_times_out() {
    init_tracing();

    let mut rng = StdRng::seed_from_u64(7);
    let ids: Vec<_> = (0..6).map(|_| NodeId::random(&mut rng)).collect();
    let specs = ids
        .iter()
        .enumerate()
        .map(|(i, id)| NodeSpec::new(*id, [if i == 0 { "stubborn" } else { SERVICE_NAME }]))
        .collect();
    let network = NetworkBuilder::new(registry(2)).build(specs).unwrap();
    let index = PeerPotIndex::build(&network.overlays(), 2);
    network.connect_topology(Topology::Ring, 0).unwrap();

    let config = HealthConfig::default()
        .with_deadline(Duration::from_secs(2))
        .with_poll_interval(Duration::from_millis(200));
    let mut monitor = HealthMonitor::new(&network, &index, config);
    let result = monitor.wait().await;

    assert_eq!(monitor.state(), MonitorState::TimedOut);
    let report = assert_matches!(result, Err(HealthError::Timeout { report, .. }) => report);
    assert_eq!(report.len(), 6);
    assert!(report.unhealthy().any(|node| node.id == ids[0]));

    network.shutdown().await;
}

#[tokio::test]
async fn test_missing_pot_fails_before_polling() {
    let mut rng = StdRng::seed_from_u64(3);
    let network = NetworkBuilder::new(registry(2))
        .create_nodes(3, &[SERVICE_NAME.to_string()], &mut rng)
        .unwrap();
    let ids = network.ids();
    let overlays = network.overlays();
    let index = PeerPotIndex::build(&overlays[1..], 2);

    let mut monitor = HealthMonitor::new(&network, &index, HealthConfig::default());
    assert_matches!(
        monitor.wait().await,
        Err(HealthError::MissingPot { node }) if node == ids[0]
    );
    assert_eq!(monitor.state(), MonitorState::Idle);

    network.shutdown().await;
}
