//! capdiscod datagram frames.
//!
//! One JSON object per UDP datagram, tagged by `type`. The coordinator
//! never sees these; the daemon's listener turns them into announcements and
//! responses. Peer identity is the datagram source, never a frame field.

use serde::{Deserialize, Serialize};

use crate::caps::{
    CapabilityAnnouncement, CorrelationId, DiscoveryPayload, DiscoveryResponse, ExtensionId,
    Fingerprint, PeerId,
};

/// Largest datagram the daemon will read or write.
pub const MAX_FRAME_LEN: usize = 8192;

/// Error condition returned for queries about nodes we don't serve.
pub const ITEM_NOT_FOUND: &str = "item-not-found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// A peer advertising its fingerprint.
    Announce {
        node: String,
        ver: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        ext: Vec<String>,
    },
    /// A discovery query for `node` (`node#ver` or `node#ver#ext`).
    Query { id: String, node: String },
    /// Successful answer to a query.
    Result {
        id: String,
        features: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_name: Option<String>,
    },
    /// The responder could not answer.
    Error { id: String, condition: String },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {0} bytes exceeds {max}", max = MAX_FRAME_LEN)]
    TooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// What an inbound frame means to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Announcement(CapabilityAnnouncement),
    Response(DiscoveryResponse),
    Query { id: String, node: String },
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(bytes.len()));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn announce(announcement: &CapabilityAnnouncement) -> Self {
        Frame::Announce {
            node: announcement.fingerprint.node().to_string(),
            ver: announcement.fingerprint.ver().to_string(),
            hash: announcement.hash.clone(),
            ext: announcement
                .extensions
                .iter()
                .map(|e| e.as_str().to_string())
                .collect(),
        }
    }

    /// Attach the sender identity and lift the frame into core types.
    pub fn into_inbound(self, from: PeerId) -> Inbound {
        match self {
            Frame::Announce { node, ver, hash, ext } => {
                Inbound::Announcement(CapabilityAnnouncement {
                    peer: from,
                    fingerprint: Fingerprint::new(node, ver),
                    hash,
                    extensions: ext.into_iter().map(ExtensionId::from).collect(),
                })
            }
            Frame::Query { id, node } => Inbound::Query { id, node },
            Frame::Result { id, features, client_name } => Inbound::Response(DiscoveryResponse {
                correlation_id: CorrelationId::from(id),
                payload: DiscoveryPayload::Features { features, client_name },
            }),
            Frame::Error { id, condition } => Inbound::Response(DiscoveryResponse {
                correlation_id: CorrelationId::from(id),
                payload: DiscoveryPayload::Error { condition },
            }),
        }
    }
}
