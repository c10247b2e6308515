//! `create` and `verify` commands.

pub mod create;
pub mod verify;

use eyre::{Result, bail};
use tracing::{info, warn};
use vertex_sim_discovery::{SERVICE_NAME, factory};
use vertex_sim_health::{HealthError, HealthMonitor};
use vertex_sim_network::{Network, NetworkBuilder, ServiceRegistry};
use vertex_swarm_kademlia::PeerPotIndex;

use crate::config::SimConfig;

/// Services every node of this tool may run.
pub fn registry(config: &SimConfig) -> ServiceRegistry {
    ServiceRegistry::new().with(SERVICE_NAME, factory(config.discovery.clone()))
}

/// Network builder for `config`.
pub fn builder(config: &SimConfig) -> NetworkBuilder {
    NetworkBuilder::new(registry(config)).with_config(config.network.clone())
}

/// Wait until every node is healthy against peer pots of `min_prox_bin_size`.
/// On timeout, logs every unhealthy node.
pub(crate) async fn await_health(
    network: &Network,
    config: &SimConfig,
    min_prox_bin_size: usize,
) -> Result<()> {
    let index = PeerPotIndex::build(&network.overlays(), min_prox_bin_size);
    let mut monitor = HealthMonitor::new(network, &index, config.health);

    match monitor.wait().await {
        Ok(convergence) => {
            info!(
                rounds = convergence.rounds,
                elapsed = ?convergence.elapsed,
                "network is healthy"
            );
            Ok(())
        }
        Err(HealthError::Timeout { elapsed, report }) => {
            for node in report.unhealthy() {
                warn!(node = %node.id, overlay = %node.overlay, reading = %node.reading, "unhealthy node");
            }
            bail!(
                "network did not become healthy within {elapsed:?}: {} of {} nodes unhealthy",
                report.unhealthy_count(),
                report.len()
            )
        }
        Err(error) => Err(error.into()),
    }
}
