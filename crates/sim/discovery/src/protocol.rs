//! Hive gossip messages.
//!
//! A message carries peer records the sender believes the receiver may not
//! know. Large lists are split into batches of at most [`MAX_BATCH_SIZE`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use vertex_swarm_primitives::{NodeId, PeerRecord};
use vertex_sim_network::ServiceError;

/// Maximum number of peers per gossip message.
pub const MAX_BATCH_SIZE: usize = 30;

/// Message exchanged between discovery services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HiveMessage {
    /// Peer announcement.
    Peers {
        /// Announced peers.
        peers: Vec<PeerRecord>,
    },
}

impl HiveMessage {
    /// Split `peers` into announcements of at most [`MAX_BATCH_SIZE`] peers.
    pub fn batches(peers: &[PeerRecord]) -> impl Iterator<Item = Self> + '_ {
        peers.chunks(MAX_BATCH_SIZE).map(|chunk| Self::Peers {
            peers: chunk.to_vec(),
        })
    }

    /// Wire encoding.
    pub fn encode(&self) -> Result<Bytes, ServiceError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode a message received from `from`.
    pub fn decode(from: &NodeId, payload: &[u8]) -> Result<Self, ServiceError> {
        serde_json::from_slice(payload).map_err(|e| ServiceError::Protocol {
            peer: *from,
            reason: e.to_string(),
        })
    }
}
