//! Create command: build a healthy network and write its snapshot.

use std::path::Path;

use eyre::{Result, WrapErr};
use rand::{SeedableRng, rngs::StdRng};
use tracing::{info, warn};
use vertex_sim_discovery::SERVICE_NAME;
use vertex_sim_network::Network;
use vertex_sim_snapshot::Snapshot;

use super::{await_health, builder};
use crate::{config::SimConfig, path};

/// Run the create command. Returns the snapshot that was written.
pub async fn run(config: &SimConfig, output: &Path) -> Result<Snapshot> {
    let output = path::prepare_output(output).await?;

    let seed = config.seed.unwrap_or_else(rand::random);
    if config.seed.is_none() {
        info!(seed, "chose random seed");
    }
    if config.topology.forces_discovery() && !config.discovery.enabled {
        warn!("topology none always runs discovery");
    }

    info!(
        nodes = config.nodes,
        topology = %config.topology,
        discovery = config.discovery.enabled,
        "creating network"
    );
    let mut rng = StdRng::seed_from_u64(seed);
    let mut network = builder(config)
        .create_nodes(config.nodes, &[SERVICE_NAME.to_string()], &mut rng)
        .wrap_err("Failed to create nodes")?;

    let result = populate(&mut network, config).await;
    network.shutdown().await;
    let snapshot = result?;

    let bytes = snapshot.to_bytes()?;
    tokio::fs::write(&output, &bytes)
        .await
        .wrap_err_with(|| format!("Failed to write snapshot to {}", output.display()))?;

    info!(
        path = %output.display(),
        nodes = snapshot.nodes.len(),
        conns = snapshot.conns.len(),
        "wrote snapshot"
    );
    Ok(snapshot)
}

async fn populate(network: &mut Network, config: &SimConfig) -> Result<Snapshot> {
    network
        .assert_quiescent(config.quiescence_window)
        .await
        .wrap_err("Nodes did not settle after start-up")?;

    let edges = network
        .connect_topology(config.topology, config.pivot)
        .wrap_err("Failed to wire the network")?;
    info!(edges, topology = %config.topology, "wired network");

    await_health(network, config, config.min_prox_bin_size()).await?;

    let snapshot = Snapshot::capture(network, &config.filter).await?;
    Ok(snapshot)
}
