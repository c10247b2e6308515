//! Convergence monitor.
//!
//! # States
//!
//! `Idle -> Polling -> {Converged, TimedOut}`
//!
//! While polling, every node is rechecked whenever it reports peer activity
//! or its fallback interval fires, whichever comes first. Both sources are
//! merged into one recheck stream per node, and all node streams into one
//! stream consumed by the coordinator loop. At most one query per node is
//! outstanding at a time.
//!
//! Once every latest reading is healthy, all nodes are queried again
//! together and convergence is decided on that single pass.

use std::{collections::HashSet, time::Duration};

use futures::{
    future::join_all,
    stream::{FuturesUnordered, select_all},
};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout_at};
use tokio_stream::{
    Stream, StreamExt,
    wrappers::{BroadcastStream, IntervalStream},
};
use tracing::{debug, info, warn};
use vertex_sim_network::{Network, NodeHandle};
use vertex_swarm_kademlia::{PeerPot, PeerPotIndex};

use crate::{HealthError, HealthReport, NodeReport, Reading};

/// Default overall deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Default fallback recheck interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Monitor configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    /// Give up after this long.
    pub deadline: Duration,
    /// Recheck a quiet node this often.
    pub poll_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl HealthConfig {
    /// Set the deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Set the fallback recheck interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorState {
    /// Not started.
    Idle,
    /// Waiting for every node to be healthy.
    Polling,
    /// Every node was healthy in one pass.
    Converged,
    /// The deadline passed first.
    TimedOut,
}

/// Successful convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convergence {
    /// Evaluation passes made, one per reading plus confirmation passes.
    pub rounds: u64,
    /// Time spent polling.
    pub elapsed: Duration,
}

/// Waits for a network to converge to its peer pots.
#[derive(Debug)]
pub struct HealthMonitor<'a> {
    network: &'a Network,
    index: &'a PeerPotIndex,
    config: HealthConfig,
    state: MonitorState,
}

impl<'a> HealthMonitor<'a> {
    /// Monitor `network` against `index`.
    pub fn new(network: &'a Network, index: &'a PeerPotIndex, config: HealthConfig) -> Self {
        Self {
            network,
            index,
            config,
            state: MonitorState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    fn transition(&mut self, state: MonitorState) {
        debug!(from = ?self.state, to = ?state, "health monitor state");
        self.state = state;
    }

    /// Block until every node is healthy at once, or the deadline passes.
    ///
    /// Readings start empty, so only answers given after this call count.
    /// Every subscription and outstanding query is released on return.
    pub async fn wait(&mut self) -> Result<Convergence, HealthError> {
        let (network, index) = (self.network, self.index);
        let nodes = network.nodes();
        let pots = nodes
            .iter()
            .map(|node| {
                index
                    .get(&node.overlay())
                    .ok_or(HealthError::MissingPot { node: node.id() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.transition(MonitorState::Polling);
        info!(
            nodes = nodes.len(),
            deadline_secs = self.config.deadline.as_secs_f64(),
            "waiting for network health"
        );

        let start = Instant::now();
        let deadline = start + self.config.deadline;
        let expired = sleep_until(deadline);
        tokio::pin!(expired);

        let mut rechecks = select_all(
            nodes
                .iter()
                .enumerate()
                .map(|(i, node)| recheck(i, node, self.config.poll_interval)),
        );
        let mut readings = vec![Reading::Missing; nodes.len()];
        let mut pending = FuturesUnordered::new();
        let mut busy = HashSet::with_capacity(nodes.len());
        let mut rounds = 0u64;

        for (i, (node, &pot)) in nodes.iter().zip(&pots).enumerate() {
            busy.insert(i);
            pending.push(query(i, node, pot));
        }

        loop {
            tokio::select! {
                _ = &mut expired => break,
                Some(i) = rechecks.next() => {
                    if let (Some(node), Some(&pot)) = (nodes.get(i), pots.get(i)) {
                        if busy.insert(i) {
                            pending.push(query(i, node, pot));
                        }
                    }
                }
                Some((i, reading)) = pending.next() => {
                    busy.remove(&i);
                    rounds += 1;
                    if let (Some(slot), Some(node)) = (readings.get_mut(i), nodes.get(i)) {
                        if slot.is_healthy() != reading.is_healthy() {
                            debug!(node = %node.id(), healthy = reading.is_healthy(), %reading, "health changed");
                        }
                        *slot = reading;
                    }
                    if !readings.iter().all(Reading::is_healthy) {
                        continue;
                    }

                    // Let outstanding queries finish, then decide on one pass.
                    let confirmation = timeout_at(deadline, async {
                        while pending.next().await.is_some() {}
                        join_all(
                            nodes
                                .iter()
                                .zip(&pots)
                                .enumerate()
                                .map(|(i, (node, &pot))| query(i, node, pot)),
                        )
                        .await
                    });
                    let Ok(confirmed) = confirmation.await else {
                        break;
                    };
                    busy.clear();
                    rounds += 1;

                    for (i, reading) in confirmed {
                        if let Some(slot) = readings.get_mut(i) {
                            *slot = reading;
                        }
                    }
                    if readings.iter().all(Reading::is_healthy) {
                        let elapsed = start.elapsed();
                        self.transition(MonitorState::Converged);
                        info!(rounds, elapsed_ms = elapsed.as_millis() as u64, "network converged");
                        return Ok(Convergence { rounds, elapsed });
                    }
                    debug!("confirmation pass found unhealthy nodes, polling on");
                }
            }
        }

        let elapsed = start.elapsed();
        let report = HealthReport {
            nodes: nodes
                .iter()
                .zip(readings)
                .map(|(node, reading)| NodeReport {
                    id: node.id(),
                    overlay: node.overlay(),
                    reading,
                })
                .collect(),
        };
        self.transition(MonitorState::TimedOut);
        warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            unhealthy = report.unhealthy_count(),
            nodes = report.len(),
            "network did not converge"
        );
        Err(HealthError::Timeout { elapsed, report })
    }
}

/// Query one node.
async fn query(i: usize, node: &NodeHandle, pot: &PeerPot) -> (usize, Reading) {
    (i, Reading::from(node.healthy(pot).await))
}

/// Recheck signals for node `i`: its peer activity merged with a fallback
/// interval.
fn recheck(i: usize, node: &NodeHandle, poll: Duration) -> impl Stream<Item = usize> + Unpin {
    // Lagged receivers still mean there was activity.
    let activity = BroadcastStream::new(node.subscribe()).map(move |_| i);

    let mut interval = interval_at(Instant::now() + poll, poll);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let fallback = IntervalStream::new(interval).map(move |_| i);

    activity.merge(fallback)
}
