//! capdisco-services — discovery coordination on top of `capdisco-core`.
//!
//! Caches, the in-flight query tracker, the per-peer ledger, and the
//! coordinator that drives them. Nothing here does I/O; queries leave
//! through a `DiscoveryTransport` supplied by the caller.

pub mod cache;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod ledger;
pub mod tracker;
pub mod transport;

pub use cache::{CapabilityCache, ExtensionCache};
pub use coordinator::{DiscoveryCoordinator, ExpiryReport, RetryPolicy};
pub use diagnostics::{DiagnosticsSnapshot, DiscoveryDiagnostics};
pub use error::{DiscoveryError, LedgerError, TrackerError};
pub use ledger::{PendingPeer, SubscriberLedger};
pub use tracker::{
    CorrelationToken, DiscoveryRequestTracker, PendingDiscovery, RequestKey, Requested,
};
pub use transport::{DiscoveryTransport, TransportError};
