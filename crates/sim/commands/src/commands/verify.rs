//! Verify command: reload a snapshot and compare the result with it.

use std::{collections::BTreeSet, path::Path};

use eyre::{Result, WrapErr, bail};
use serde::Deserialize;
use tracing::{debug, info};
use vertex_sim_discovery::{DiscoveryState, SERVICE_NAME};
use vertex_sim_network::Network;
use vertex_sim_snapshot::Snapshot;

use super::{await_health, builder};
use crate::{config::SimConfig, path};

/// Run the verify command. Returns the snapshot that was checked.
pub async fn run(config: &SimConfig, input: &Path) -> Result<Snapshot> {
    let input = path::resolve(input)?;
    let bytes = tokio::fs::read(&input)
        .await
        .wrap_err_with(|| format!("Failed to read snapshot {}", input.display()))?;
    let snapshot = Snapshot::from_bytes(&bytes)
        .wrap_err_with(|| format!("Invalid snapshot {}", input.display()))?;
    info!(
        path = %input.display(),
        nodes = snapshot.nodes.len(),
        conns = snapshot.conns.len(),
        "read snapshot"
    );

    let network = snapshot
        .load(&builder(config))
        .await
        .wrap_err("Failed to load snapshot")?;

    let result = check(&snapshot, &network, config).await;
    network.shutdown().await;
    result?;

    info!("snapshot verified");
    Ok(snapshot)
}

async fn check(snapshot: &Snapshot, network: &Network, config: &SimConfig) -> Result<()> {
    snapshot.verify_against(network)?;
    if config.check_health {
        let min_prox_bin_size = match captured_bin_size(snapshot)? {
            Some(size) => size,
            None => {
                debug!("snapshot carries no discovery state, using configured bin size");
                config.min_prox_bin_size()
            }
        };
        await_health(network, config, min_prox_bin_size).await?;
    }
    Ok(())
}

/// Bin size the captured discovery services were built with, if any were
/// captured. Nodes must agree.
pub(crate) fn captured_bin_size(snapshot: &Snapshot) -> Result<Option<usize>> {
    let mut sizes = BTreeSet::new();
    for node in &snapshot.nodes {
        let Some(state) = node.services.get(SERVICE_NAME).filter(|state| !state.is_null()) else {
            continue;
        };
        let state = DiscoveryState::deserialize(state)
            .wrap_err_with(|| format!("Invalid discovery state on node {}", node.id))?;
        sizes.insert(state.min_prox_bin_size);
    }

    let mut sizes = sizes.into_iter();
    match (sizes.next(), sizes.next()) {
        (None, _) => Ok(None),
        (Some(size), None) => Ok(Some(size)),
        (Some(a), Some(b)) => {
            bail!("Snapshot nodes disagree on min_prox_bin_size ({a} and {b})")
        }
    }
}
