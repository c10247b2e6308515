//! Peer discovery service for simulated Swarm nodes.
//!
//! Every node runs a [`DiscoveryService`] registered as [`SERVICE_NAME`]. It
//! combines hive-style gossip of [`PeerRecord`](vertex_swarm_primitives::PeerRecord)s
//! with a kademlia table deciding whom to dial, and answers the
//! [`Healthy`](vertex_sim_network::RpcRequest::Healthy) diagnostic request
//! from that table.

mod config;
mod protocol;
mod service;

pub use config::DiscoveryConfig;
pub use protocol::{HiveMessage, MAX_BATCH_SIZE};
pub use service::{DiscoveryService, DiscoveryState};

use vertex_sim_network::{NodeService, ServiceFactory, factory_fn};

/// Name the discovery service is registered under.
pub const SERVICE_NAME: &str = "discovery";

/// Factory creating discovery services with `config`.
pub fn factory(config: DiscoveryConfig) -> impl ServiceFactory + 'static {
    factory_fn(move |local, state| {
        let service = DiscoveryService::new(local.clone(), config.clone(), state)?;
        Ok(Box::new(service) as Box<dyn NodeService>)
    })
}
