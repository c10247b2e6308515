//! Pluggable node services.
//!
//! Every simulated node runs a set of named [`NodeService`]s inside its actor.
//! Services are created by a [`ServiceFactory`] looked up by name in a
//! [`ServiceRegistry`], and reach the rest of the network only through the
//! [`ServiceContext`] handed to every callback.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Weak},
};

use bytes::Bytes;
use serde_json::Value;
use vertex_swarm_primitives::{NodeId, PeerRecord};

use crate::{
    NetworkError, ServiceError,
    network::NetworkInner,
    rpc::{RpcError, RpcRequest, RpcResponse},
};

/// A service running on a simulated node.
///
/// All callbacks run on the node's actor task, one at a time.
pub trait NodeService: Send + 'static {
    /// Called once before the node processes its first command.
    fn on_start(&mut self, _ctx: &ServiceContext) {}

    /// A peer connected.
    fn on_peer_connected(&mut self, _ctx: &ServiceContext, _peer: &PeerRecord) {}

    /// A peer disconnected.
    fn on_peer_disconnected(&mut self, _ctx: &ServiceContext, _peer: &PeerRecord) {}

    /// A message for this service arrived from a connected peer.
    fn on_message(
        &mut self,
        _ctx: &ServiceContext,
        _from: &PeerRecord,
        _payload: Bytes,
    ) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Periodic housekeeping.
    fn on_tick(&mut self, _ctx: &ServiceContext) {}

    /// Answer a diagnostic request, or `None` if this service does not
    /// handle it.
    fn on_rpc(&mut self, _request: &RpcRequest) -> Option<Result<RpcResponse, RpcError>> {
        None
    }

    /// Capture the service state for a snapshot.
    fn snapshot(&self) -> Value {
        Value::Null
    }

    /// Called once when the node stops.
    fn on_stop(&mut self) {}
}

/// Creates service instances for nodes.
pub trait ServiceFactory: Send + Sync {
    /// Create the service for the node `local`, restoring `state` when the
    /// node is rebuilt from a snapshot.
    fn create(
        &self,
        local: &PeerRecord,
        state: Option<&Value>,
    ) -> Result<Box<dyn NodeService>, ServiceError>;
}

impl<F> ServiceFactory for F
where
    F: Fn(&PeerRecord, Option<&Value>) -> Result<Box<dyn NodeService>, ServiceError>
        + Send
        + Sync,
{
    fn create(
        &self,
        local: &PeerRecord,
        state: Option<&Value>,
    ) -> Result<Box<dyn NodeService>, ServiceError> {
        self(local, state)
    }
}

/// Build a [`ServiceFactory`] from a closure.
pub fn factory_fn<F>(f: F) -> F
where
    F: Fn(&PeerRecord, Option<&Value>) -> Result<Box<dyn NodeService>, ServiceError>
        + Send
        + Sync
        + 'static,
{
    f
}

/// Explicit mapping from service name to factory.
///
/// Built once at start-up and passed by reference to whoever creates nodes.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    factories: BTreeMap<String, Arc<dyn ServiceFactory>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: impl ServiceFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, factory: impl ServiceFactory + 'static) -> Self {
        self.register(name, factory);
        self
    }

    /// Factory registered under `name`.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn ServiceFactory>, NetworkError> {
        self.factories
            .get(name)
            .ok_or_else(|| NetworkError::UnknownService(name.to_string()))
    }

    /// Whether a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A service's view of the network.
#[derive(Clone)]
pub struct ServiceContext {
    local: PeerRecord,
    service: String,
    network: Weak<NetworkInner>,
}

impl ServiceContext {
    pub(crate) fn new(local: PeerRecord, service: String, network: Weak<NetworkInner>) -> Self {
        Self {
            local,
            service,
            network,
        }
    }

    /// The node this service runs on.
    pub fn local(&self) -> &PeerRecord {
        &self.local
    }

    /// Name this service is registered under.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn network(&self) -> Result<Arc<NetworkInner>, NetworkError> {
        self.network
            .upgrade()
            .ok_or(NetworkError::NodeStopped(self.local.id))
    }

    /// Open a connection to `peer`.
    pub fn dial(&self, peer: &NodeId) -> Result<(), NetworkError> {
        self.network()?.connect(&self.local.id, peer)
    }

    /// Send `payload` to the same service on a connected peer.
    pub fn send(&self, peer: &NodeId, payload: Bytes) -> Result<(), NetworkError> {
        self.network()?
            .deliver(&self.local, peer, &self.service, payload)
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("local", &self.local.id)
            .field("service", &self.service)
            .finish()
    }
}
