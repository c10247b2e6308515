//! Simulated node: a handle and the actor behind it.

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, trace, warn};
use vertex_swarm_kademlia::{Health, PeerPot};
use vertex_swarm_primitives::{NodeId, OverlayAddress, PeerRecord};

use crate::{
    NetworkError, NetworkEvent, PeerEvent,
    events::EventEmitter,
    rpc::{RpcError, RpcRequest, RpcResponse},
    service::{NodeService, ServiceContext},
};

/// Commands processed by a node actor, in arrival order.
#[derive(Debug)]
pub(crate) enum NodeCommand {
    PeerConnected(PeerRecord),
    PeerDisconnected(PeerRecord),
    Message {
        from: PeerRecord,
        service: String,
        payload: Bytes,
    },
    Rpc {
        request: RpcRequest,
        reply: oneshot::Sender<Result<RpcResponse, RpcError>>,
    },
    Capture {
        reply: oneshot::Sender<BTreeMap<String, Value>>,
    },
    Stop,
}

/// Handle to a running node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    record: PeerRecord,
    commands: mpsc::UnboundedSender<NodeCommand>,
    events: EventEmitter<PeerEvent>,
}

impl NodeHandle {
    pub(crate) fn new(
        record: PeerRecord,
        commands: mpsc::UnboundedSender<NodeCommand>,
        events: EventEmitter<PeerEvent>,
    ) -> Self {
        Self {
            record,
            commands,
            events,
        }
    }

    /// Node identifier.
    pub fn id(&self) -> NodeId {
        self.record.id
    }

    /// Overlay address.
    pub fn overlay(&self) -> OverlayAddress {
        self.record.overlay
    }

    /// Full peer record.
    pub fn record(&self) -> &PeerRecord {
        &self.record
    }

    /// Subscribe to the node's peer activity.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn send(&self, command: NodeCommand) -> Result<(), NetworkError> {
        self.commands
            .send(command)
            .map_err(|_| NetworkError::NodeStopped(self.record.id))
    }

    /// Issue a diagnostic request.
    pub async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RpcError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(NodeCommand::Rpc { request, reply })
            .map_err(|_| RpcError::NodeStopped(self.record.id))?;
        response
            .await
            .map_err(|_| RpcError::NodeStopped(self.record.id))?
    }

    /// Evaluate the node's health against `pot`.
    pub async fn healthy(&self, pot: &PeerPot) -> Result<Health, RpcError> {
        let request = RpcRequest::Healthy(Box::new(pot.clone()));
        let method = request.method();
        match self.call(request).await? {
            RpcResponse::Healthy(health) => Ok(health),
            _ => Err(RpcError::UnexpectedResponse {
                node: self.record.id,
                method,
            }),
        }
    }

    /// Connected peers, in identifier order.
    pub async fn peers(&self) -> Result<Vec<PeerRecord>, RpcError> {
        match self.call(RpcRequest::Peers).await? {
            RpcResponse::Peers(peers) => Ok(peers),
            _ => Err(RpcError::UnexpectedResponse {
                node: self.record.id,
                method: RpcRequest::Peers.method(),
            }),
        }
    }

    /// Capture the state of every service, keyed by service name.
    pub async fn capture(&self) -> Result<BTreeMap<String, Value>, NetworkError> {
        let (reply, states) = oneshot::channel();
        self.send(NodeCommand::Capture { reply })?;
        states
            .await
            .map_err(|_| NetworkError::NodeStopped(self.record.id))
    }
}

/// A service together with the context it was created for.
pub(crate) struct RunningService {
    pub(crate) ctx: ServiceContext,
    pub(crate) service: Box<dyn NodeService>,
}

/// Actor owning a node's services and peer set.
pub(crate) struct NodeActor {
    record: PeerRecord,
    services: Vec<RunningService>,
    peers: BTreeMap<NodeId, PeerRecord>,
    events: EventEmitter<PeerEvent>,
    network_events: EventEmitter<NetworkEvent>,
    tick_interval: Duration,
}

impl NodeActor {
    pub(crate) fn new(
        record: PeerRecord,
        services: Vec<RunningService>,
        events: EventEmitter<PeerEvent>,
        network_events: EventEmitter<NetworkEvent>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            record,
            services,
            peers: BTreeMap::new(),
            events,
            network_events,
            tick_interval,
        }
    }

    /// Process commands until told to stop or every handle is gone.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<NodeCommand>) {
        let id = self.record.id;
        debug!(
            node = %id,
            overlay = %self.record.overlay.short(),
            services = self.services.len(),
            "node started"
        );
        self.network_events.emit(NetworkEvent::NodeUp(id));

        for RunningService { ctx, service } in &mut self.services {
            service.on_start(ctx);
        }

        let mut tick = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(NodeCommand::Stop) => break,
                    Some(command) => self.handle(command),
                },
                _ = tick.tick() => {
                    for RunningService { ctx, service } in &mut self.services {
                        service.on_tick(ctx);
                    }
                }
            }
        }

        drop(commands);
        for RunningService { service, .. } in &mut self.services {
            service.on_stop();
        }
        self.network_events.emit(NetworkEvent::NodeDown(id));
        debug!(node = %id, peers = self.peers.len(), "node stopped");
    }

    fn handle(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::PeerConnected(peer) => {
                if self.peers.insert(peer.id, peer.clone()).is_some() {
                    return;
                }
                trace!(node = %self.record.id, peer = %peer.id, "peer added");
                for RunningService { ctx, service } in &mut self.services {
                    service.on_peer_connected(ctx, &peer);
                }
                self.events.emit(PeerEvent::Added(peer));
            }
            NodeCommand::PeerDisconnected(peer) => {
                if self.peers.remove(&peer.id).is_none() {
                    return;
                }
                trace!(node = %self.record.id, peer = %peer.id, "peer dropped");
                for RunningService { ctx, service } in &mut self.services {
                    service.on_peer_disconnected(ctx, &peer);
                }
                self.events.emit(PeerEvent::Dropped(peer));
            }
            NodeCommand::Message {
                from,
                service: name,
                payload,
            } => {
                if !self.peers.contains_key(&from.id) {
                    trace!(node = %self.record.id, from = %from.id, "message from unknown peer dropped");
                    return;
                }
                let Some(RunningService { ctx, service }) =
                    self.services.iter_mut().find(|s| s.ctx.service() == name)
                else {
                    trace!(node = %self.record.id, service = %name, "message for missing service dropped");
                    return;
                };
                if let Err(error) = service.on_message(ctx, &from, payload) {
                    warn!(
                        node = %self.record.id,
                        from = %from.id,
                        service = %name,
                        %error,
                        "service rejected message"
                    );
                }
                self.events.emit(PeerEvent::Message {
                    from: from.id,
                    service: name,
                });
            }
            NodeCommand::Rpc { request, reply } => {
                let response = self.rpc(&request);
                let _ = reply.send(response);
            }
            NodeCommand::Capture { reply } => {
                let states = self
                    .services
                    .iter()
                    .map(|s| (s.ctx.service().to_string(), s.service.snapshot()))
                    .collect();
                let _ = reply.send(states);
            }
            NodeCommand::Stop => {}
        }
    }

    fn rpc(&mut self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
        if let RpcRequest::Peers = request {
            return Ok(RpcResponse::Peers(self.peers.values().cloned().collect()));
        }
        for RunningService { service, .. } in &mut self.services {
            if let Some(response) = service.on_rpc(request) {
                return response;
            }
        }
        Err(RpcError::Unsupported {
            node: self.record.id,
            method: request.method(),
        })
    }
}
