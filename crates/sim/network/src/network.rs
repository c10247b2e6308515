//! Network construction, connection registry and topology wiring.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, trace, warn};
use vertex_swarm_primitives::{NodeId, OverlayAddress, PeerRecord};

use crate::{
    NetworkError, NetworkEvent, Topology,
    events::{DEFAULT_CHANNEL_CAPACITY, EventEmitter},
    node::{NodeActor, NodeCommand, NodeHandle, RunningService},
    service::{ServiceContext, ServiceRegistry},
};

/// Default interval between service housekeeping ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Runtime parameters of a simulated network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Interval between service ticks on every node.
    pub tick_interval: Duration,
    /// Buffer of every event channel.
    pub event_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl NetworkConfig {
    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// Description of a node to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    /// Node identifier.
    pub id: NodeId,
    /// Services to run, with the state to restore (`None` starts fresh).
    pub services: BTreeMap<String, Option<Value>>,
}

impl NodeSpec {
    /// A node running fresh instances of `services`.
    pub fn new<S: Into<String>>(id: NodeId, services: impl IntoIterator<Item = S>) -> Self {
        Self {
            id,
            services: services.into_iter().map(|s| (s.into(), None)).collect(),
        }
    }
}

/// A wired link between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Dialling node.
    pub a: NodeId,
    /// Dialled node.
    pub b: NodeId,
    /// Whether the link is currently up.
    pub up: bool,
}

impl Connection {
    /// Unordered identity of the link.
    pub fn key(&self) -> (NodeId, NodeId) {
        conn_key(&self.a, &self.b)
    }
}

fn conn_key(a: &NodeId, b: &NodeId) -> (NodeId, NodeId) {
    if a <= b { (*a, *b) } else { (*b, *a) }
}

/// State shared between the network owner and the services of its nodes.
pub(crate) struct NetworkInner {
    nodes: Vec<NodeHandle>,
    index: HashMap<NodeId, usize>,
    conns: Mutex<BTreeMap<(NodeId, NodeId), Connection>>,
    events: EventEmitter<NetworkEvent>,
}

impl NetworkInner {
    fn node(&self, id: &NodeId) -> Result<&NodeHandle, NetworkError> {
        self.index
            .get(id)
            .and_then(|i| self.nodes.get(*i))
            .ok_or(NetworkError::UnknownNode(*id))
    }

    pub(crate) fn connect(&self, a: &NodeId, b: &NodeId) -> Result<(), NetworkError> {
        if a == b {
            return Err(NetworkError::SelfConnection(*a));
        }
        let dialer = self.node(a)?;
        let target = self.node(b)?;
        let key = conn_key(a, b);

        let mut conns = self.conns.lock();
        if conns.get(&key).is_some_and(|conn| conn.up) {
            return Err(NetworkError::AlreadyConnected { a: *a, b: *b });
        }

        dialer.send(NodeCommand::PeerConnected(target.record().clone()))?;
        if let Err(error) = target.send(NodeCommand::PeerConnected(dialer.record().clone())) {
            let _ = dialer.send(NodeCommand::PeerDisconnected(target.record().clone()));
            return Err(error);
        }
        conns.insert(key, Connection { a: *a, b: *b, up: true });
        drop(conns);

        trace!(a = %a, b = %b, "connection up");
        self.events.emit(NetworkEvent::ConnUp { a: *a, b: *b });
        Ok(())
    }

    fn disconnect(&self, a: &NodeId, b: &NodeId) -> Result<(), NetworkError> {
        let mut conns = self.conns.lock();
        let conn = conns
            .get_mut(&conn_key(a, b))
            .filter(|conn| conn.up)
            .ok_or(NetworkError::NotConnected { a: *a, b: *b })?;
        conn.up = false;
        let conn = *conn;
        self.notify_down(&conn);
        Ok(())
    }

    /// Forget a link entirely.
    fn remove(&self, a: &NodeId, b: &NodeId) {
        let removed = self.conns.lock().remove(&conn_key(a, b));
        if let Some(conn) = removed.filter(|conn| conn.up) {
            self.notify_down(&conn);
        }
    }

    fn notify_down(&self, conn: &Connection) {
        if let (Ok(a), Ok(b)) = (self.node(&conn.a), self.node(&conn.b)) {
            // Stopped nodes have nothing left to update.
            let _ = a.send(NodeCommand::PeerDisconnected(b.record().clone()));
            let _ = b.send(NodeCommand::PeerDisconnected(a.record().clone()));
        }
        trace!(a = %conn.a, b = %conn.b, "connection down");
        self.events.emit(NetworkEvent::ConnDown { a: conn.a, b: conn.b });
    }

    pub(crate) fn deliver(
        &self,
        from: &PeerRecord,
        to: &NodeId,
        service: &str,
        payload: Bytes,
    ) -> Result<(), NetworkError> {
        let up = self
            .conns
            .lock()
            .get(&conn_key(&from.id, to))
            .is_some_and(|conn| conn.up);
        if !up {
            return Err(NetworkError::NotConnected { a: from.id, b: *to });
        }
        self.node(to)?.send(NodeCommand::Message {
            from: from.clone(),
            service: service.to_string(),
            payload,
        })
    }
}

/// Creates networks of nodes running services from a registry.
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    config: NetworkConfig,
    registry: ServiceRegistry,
}

impl NetworkBuilder {
    /// Builder resolving services in `registry`.
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            config: NetworkConfig::default(),
            registry,
        }
    }

    /// Set the network configuration.
    pub fn with_config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Service registry in use.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Create `count` nodes with identifiers drawn from `rng`, each running
    /// fresh instances of `services`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn create_nodes<R: RngCore + ?Sized>(
        &self,
        count: usize,
        services: &[String],
        rng: &mut R,
    ) -> Result<Network, NetworkError> {
        let specs = (0..count)
            .map(|_| NodeSpec::new(NodeId::random(rng), services.iter().cloned()))
            .collect();
        self.build(specs)
    }

    /// Create one node per spec, in order, and start them.
    ///
    /// Every service is created before any node starts, so a failing factory
    /// leaves nothing running. Must be called within a Tokio runtime.
    pub fn build(&self, specs: Vec<NodeSpec>) -> Result<Network, NetworkError> {
        if specs.is_empty() {
            return Err(NetworkError::NoNodes);
        }

        let mut index = HashMap::with_capacity(specs.len());
        let mut prepared = Vec::with_capacity(specs.len());
        for (i, spec) in specs.into_iter().enumerate() {
            if index.insert(spec.id, i).is_some() {
                return Err(NetworkError::DuplicateNode(spec.id));
            }

            let record = PeerRecord::new(spec.id);
            let mut services = Vec::with_capacity(spec.services.len());
            for (name, state) in spec.services {
                let service = self
                    .registry
                    .get(&name)?
                    .create(&record, state.as_ref())
                    .map_err(|source| NetworkError::Service {
                        node: spec.id,
                        service: name.clone(),
                        source: Box::new(source),
                    })?;
                services.push((name, service));
            }
            prepared.push((record, services));
        }

        let capacity = self.config.event_capacity;
        let events = EventEmitter::new(capacity);
        let startup_events = events.subscribe();

        let mut nodes = Vec::with_capacity(prepared.len());
        let mut actors = Vec::with_capacity(prepared.len());
        for (record, services) in prepared {
            let (commands_tx, commands_rx) = tokio::sync::mpsc::unbounded_channel();
            let peer_events = EventEmitter::new(capacity);
            nodes.push(NodeHandle::new(record.clone(), commands_tx, peer_events.clone()));
            actors.push((record, services, peer_events, commands_rx));
        }

        let inner = Arc::new(NetworkInner {
            nodes,
            index,
            conns: Mutex::new(BTreeMap::new()),
            events: events.clone(),
        });

        let tasks = actors
            .into_iter()
            .map(|(record, services, peer_events, commands)| {
                let services = services
                    .into_iter()
                    .map(|(name, service)| RunningService {
                        ctx: ServiceContext::new(record.clone(), name, Arc::downgrade(&inner)),
                        service,
                    })
                    .collect();
                let actor = NodeActor::new(
                    record,
                    services,
                    peer_events,
                    events.clone(),
                    self.config.tick_interval,
                );
                tokio::spawn(actor.run(commands))
            })
            .collect();

        info!(
            nodes = inner.nodes.len(),
            services = ?self.registry.names().collect::<Vec<_>>(),
            "network created"
        );

        Ok(Network {
            inner,
            tasks,
            startup_events: Some(startup_events),
        })
    }
}

/// A running simulated network.
///
/// Dropping the network aborts every node still running; [`shutdown`]
/// stops them gracefully.
///
/// [`shutdown`]: Network::shutdown
pub struct Network {
    inner: Arc<NetworkInner>,
    tasks: Vec<JoinHandle<()>>,
    /// Events recorded since creation, consumed by the quiescence check.
    startup_events: Option<broadcast::Receiver<NetworkEvent>>,
}

impl Network {
    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Whether the network has no nodes.
    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.inner.nodes
    }

    /// Node with identifier `id`.
    pub fn node(&self, id: &NodeId) -> Option<&NodeHandle> {
        self.inner.node(id).ok()
    }

    /// Node identifiers in creation order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.inner.nodes.iter().map(NodeHandle::id).collect()
    }

    /// Overlay addresses in creation order.
    pub fn overlays(&self) -> Vec<OverlayAddress> {
        self.inner.nodes.iter().map(NodeHandle::overlay).collect()
    }

    /// Subscribe to network events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.inner.events.subscribe()
    }

    /// Connect `a` to `b`; `a` is recorded as the dialler.
    pub fn connect(&self, a: &NodeId, b: &NodeId) -> Result<(), NetworkError> {
        self.inner.connect(a, b)
    }

    /// Take the link between `a` and `b` down. The link stays recorded.
    pub fn disconnect(&self, a: &NodeId, b: &NodeId) -> Result<(), NetworkError> {
        self.inner.disconnect(a, b)
    }

    /// Whether `a` and `b` are connected.
    pub fn is_connected(&self, a: &NodeId, b: &NodeId) -> bool {
        self.inner
            .conns
            .lock()
            .get(&conn_key(a, b))
            .is_some_and(|conn| conn.up)
    }

    /// Every recorded link, sorted by unordered pair.
    pub fn conns(&self) -> Vec<Connection> {
        self.inner.conns.lock().values().copied().collect()
    }

    /// Wire `topology` over the nodes in creation order.
    ///
    /// Pairs that are already connected are skipped. When any edge fails,
    /// every edge made by this call is removed again. Returns the number of
    /// edges made.
    pub fn connect_topology(&self, topology: Topology, pivot: usize) -> Result<usize, NetworkError> {
        let ids = self.ids();
        let edges = topology.edges(ids.len(), pivot)?;

        let mut made: Vec<(NodeId, NodeId)> = Vec::with_capacity(edges.len());
        for (i, j) in edges {
            let (Some(a), Some(b)) = (ids.get(i), ids.get(j)) else {
                continue;
            };
            match self.inner.connect(a, b) {
                Ok(()) => made.push((*a, *b)),
                Err(NetworkError::AlreadyConnected { .. }) => {}
                Err(source) => {
                    for (x, y) in made.iter().rev() {
                        self.inner.remove(x, y);
                    }
                    warn!(%topology, a = %a, b = %b, error = %source, "topology wiring failed");
                    return Err(NetworkError::Topology {
                        topology,
                        a: *a,
                        b: *b,
                        source: Box::new(source),
                    });
                }
            }
        }

        info!(%topology, nodes = ids.len(), edges = made.len(), "topology wired");
        Ok(made.len())
    }

    /// Fail if any connection comes up within `window`.
    ///
    /// Observes every event since the network was created, so connections
    /// made by eagerly dialling services are caught even when they happened
    /// before this call.
    pub async fn assert_quiescent(&mut self, window: Duration) -> Result<(), NetworkError> {
        let mut events = match self.startup_events.take() {
            Some(events) => events,
            None => self.inner.events.subscribe(),
        };

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.recv() => match event {
                    Ok(NetworkEvent::ConnUp { a, b }) => {
                        return Err(NetworkError::NotQuiescent { a, b });
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "quiescence check lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        if let Some(conn) = self.inner.conns.lock().values().find(|conn| conn.up) {
            return Err(NetworkError::NotQuiescent {
                a: conn.a,
                b: conn.b,
            });
        }

        debug!(window_ms = window.as_millis() as u64, "network is quiescent");
        Ok(())
    }

    /// Ask one node to stop. Its links stay recorded.
    pub fn stop_node(&self, id: &NodeId) -> Result<(), NetworkError> {
        self.inner.node(id)?.send(NodeCommand::Stop)
    }

    /// Stop every node and wait for them to finish.
    pub async fn shutdown(mut self) {
        for node in &self.inner.nodes {
            let _ = node.send(NodeCommand::Stop);
        }
        for task in std::mem::take(&mut self.tasks) {
            if let Err(error) = task.await {
                warn!(%error, "node task failed");
            }
        }
        debug!(nodes = self.inner.nodes.len(), "network shut down");
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("nodes", &self.len())
            .field("conns", &self.inner.conns.lock().len())
            .finish()
    }
}
