//! UDP discovery transport.
//!
//! Queries go out as `query` frames with a fresh correlation id. Sends go
//! through a std clone of the daemon's non-blocking socket, so the
//! coordinator task never awaits the network and never depends on tokio's
//! write readiness. A full socket buffer is reported as a send failure.

use std::net::{SocketAddr, UdpSocket};

use capdisco_core::wire::Frame;
use capdisco_core::{CorrelationId, PeerId};
use capdisco_services::{DiscoveryTransport, TransportError};

pub struct UdpTransport {
    /// Non-blocking clone of the listener's socket.
    socket: UdpSocket,
    /// Distinguishes ids across daemon restarts.
    prefix: String,
    next_id: u64,
}

impl UdpTransport {
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            prefix: format!("{:x}", std::process::id()),
            next_id: 0,
        }
    }

    fn next_correlation_id(&mut self) -> CorrelationId {
        self.next_id += 1;
        CorrelationId::new(format!("{}-{}", self.prefix, self.next_id))
    }
}

/// Peers are identified by the address their announcement came from.
pub fn peer_addr(peer: &PeerId) -> Option<SocketAddr> {
    peer.as_str().parse().ok()
}

impl DiscoveryTransport for UdpTransport {
    fn send_query(&mut self, target: &PeerId, node: &str) -> Result<CorrelationId, TransportError> {
        let addr = peer_addr(target).ok_or_else(|| TransportError::InvalidTarget(target.clone()))?;

        let id = self.next_correlation_id();
        let frame = Frame::Query {
            id: id.as_str().to_string(),
            node: node.to_string(),
        };
        let bytes = frame.encode().map_err(|e| TransportError::Encode {
            node: node.to_string(),
            reason: e.to_string(),
        })?;

        self.socket
            .send_to(&bytes, addr)
            .map_err(|source| TransportError::Io {
                target: target.clone(),
                source,
            })?;
        tracing::trace!(%addr, node, id = %id, "query frame sent");
        Ok(id)
    }
}
