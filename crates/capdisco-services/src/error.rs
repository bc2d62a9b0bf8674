//! Error taxonomy for discovery coordination.
//!
//! None of these reach the application layer. The coordinator recovers from
//! each one locally, logs it, and counts it in `DiscoveryDiagnostics`.

use capdisco_core::{CorrelationId, Fingerprint, PeerId};

use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// Response for a query that is not in flight: stale, duplicate, or
    /// never issued.
    #[error("no pending discovery query for correlation id {0}")]
    UnknownCorrelation(CorrelationId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("peer {0} is not pending")]
    NotPending(PeerId),
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    /// A peer would have been emitted twice.
    #[error("peer {0} already resolved")]
    DuplicateResolution(PeerId),
    /// The responder answered with an error instead of features.
    #[error("remote discovery error for {node}: {condition}")]
    RemoteDiscovery { node: String, condition: String },
    /// Emission was attempted before the main set was cached.
    #[error("no cached capabilities for {0}")]
    MissingCapabilities(Fingerprint),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
