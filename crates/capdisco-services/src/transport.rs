//! Transport trait for discovery queries.
//!
//! The coordinator never waits on the network. It hands a query node to the
//! transport, gets back a correlation id, and later sees that id again on a
//! `DiscoveryResponse` delivered as a separate event.

use capdisco_core::{CorrelationId, PeerId};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot address peer {0}")]
    InvalidTarget(PeerId),
    #[error("failed to encode query for {node}: {reason}")]
    Encode { node: String, reason: String },
    #[error("send to {target} failed: {source}")]
    Io {
        target: PeerId,
        #[source]
        source: std::io::Error,
    },
    #[error("transport closed")]
    Closed,
}

/// Sends discovery queries.
///
/// Intentionally minimal: the returned id must be unique for the lifetime
/// of the process, and must come back on the matching response. Nothing
/// else about the response is trusted.
pub trait DiscoveryTransport {
    fn send_query(&mut self, target: &PeerId, node: &str) -> Result<CorrelationId, TransportError>;
}

impl<T: DiscoveryTransport + ?Sized> DiscoveryTransport for &mut T {
    fn send_query(&mut self, target: &PeerId, node: &str) -> Result<CorrelationId, TransportError> {
        (**self).send_query(target, node)
    }
}

impl<T: DiscoveryTransport + ?Sized> DiscoveryTransport for Box<T> {
    fn send_query(&mut self, target: &PeerId, node: &str) -> Result<CorrelationId, TransportError> {
        (**self).send_query(target, node)
    }
}
