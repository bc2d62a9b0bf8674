//! capdisco-core — shared capability types, the feature table, datagram
//! frames, and configuration. All other capdisco crates depend on this one.

pub mod caps;
pub mod config;
pub mod features;
pub mod wire;

pub use caps::{
    CapabilityAnnouncement, CapabilitySet, CapabilitySetBuilder, CorrelationId,
    DiscoveryPayload, DiscoveryResponse, ExtensionId, Fingerprint,
    PeerCapabilitiesResolved, PeerId,
};
pub use features::translate_features;
