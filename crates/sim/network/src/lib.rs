//! In-process simulated network of Swarm nodes.
//!
//! A [`NetworkBuilder`] creates nodes from a [`ServiceRegistry`]; every node
//! is an actor task running its [`NodeService`]s. The resulting [`Network`]
//! owns the connection registry, wires a [`Topology`], and hands out
//! [`NodeHandle`]s for diagnostic RPC and peer event subscriptions.
//!
//! # Events
//!
//! - [`NetworkEvent`]: node up/down and connection up/down, network-wide.
//! - [`PeerEvent`]: peer activity seen by one node.

mod error;
mod events;
mod network;
mod node;
mod rpc;
mod service;
mod topology;

pub use error::{NetworkError, ServiceError};
pub use events::{DEFAULT_CHANNEL_CAPACITY, EventEmitter, NetworkEvent, PeerEvent};
pub use network::{
    Connection, DEFAULT_TICK_INTERVAL, Network, NetworkBuilder, NetworkConfig, NodeSpec,
};
pub use node::NodeHandle;
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use service::{NodeService, ServiceContext, ServiceFactory, ServiceRegistry, factory_fn};
pub use topology::Topology;
