//! Capability types — what peers advertise and what discovery resolves.
//!
//! A fingerprint is content-addressed: `ver` is a hash over the capability
//! payload, so any two peers advertising the same fingerprint offer the same
//! features. Nothing in this crate recomputes or verifies that hash.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::translate_features;

// ── Identifiers ───────────────────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identity of an announcing peer. The daemon uses the datagram source
    /// address; embedders may use whatever uniquely names a peer.
    PeerId
);

string_id!(
    /// Legacy extension identifier advertised next to a fingerprint.
    ExtensionId
);

string_id!(
    /// Opaque id handed back by the transport for every query it sends.
    /// Only the transport gives it meaning; the coordinator compares it.
    CorrelationId
);

// ── Fingerprint ───────────────────────────────────────────────────────────────

/// The (node, verification string) pair identifying one capability set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    node: String,
    ver: String,
}

impl Fingerprint {
    pub fn new(node: impl Into<String>, ver: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            ver: ver.into(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn ver(&self) -> &str {
        &self.ver
    }

    /// Node string queried for the main capability set: `node#ver`.
    pub fn query_node(&self) -> String {
        self.to_string()
    }

    /// Node string queried for a legacy extension: `node#ver#ext`.
    pub fn extension_node(&self, ext: &ExtensionId) -> String {
        format!("{self}#{ext}")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.node, self.ver)
    }
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// A peer advertising a fingerprint and, optionally, legacy extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityAnnouncement {
    pub peer: PeerId,
    pub fingerprint: Fingerprint,
    /// Hash algorithm tag (`sha-1`, ...). Absent for legacy announcements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub extensions: Vec<ExtensionId>,
}

impl CapabilityAnnouncement {
    pub fn new(peer: impl Into<PeerId>, fingerprint: Fingerprint) -> Self {
        Self {
            peer: peer.into(),
            fingerprint,
            hash: None,
            extensions: Vec::new(),
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_extensions<I, E>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<ExtensionId>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

/// A reply to a discovery query, correlated only through `correlation_id`.
///
/// Responders are known to echo the queried node incorrectly, so the payload
/// carries no identifying fields at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub correlation_id: CorrelationId,
    pub payload: DiscoveryPayload,
}

impl DiscoveryResponse {
    pub fn features<I, S>(correlation_id: impl Into<CorrelationId>, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            correlation_id: correlation_id.into(),
            payload: DiscoveryPayload::Features {
                features: features.into_iter().map(Into::into).collect(),
                client_name: None,
            },
        }
    }

    pub fn error(correlation_id: impl Into<CorrelationId>, condition: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload: DiscoveryPayload::Error {
                condition: condition.into(),
            },
        }
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        if let DiscoveryPayload::Features { client_name, .. } = &mut self.payload {
            *client_name = Some(name.into());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryPayload {
    /// The queried node's raw feature identifiers.
    Features {
        features: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_name: Option<String>,
    },
    /// The remote could not answer (item-not-found, service-unavailable, ...).
    Error { condition: String },
}

// ── Resolved ──────────────────────────────────────────────────────────────────

/// Resolved capabilities for one fingerprint, or the merged view for a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Raw feature identifiers, deduplicated, in first-seen order.
    pub features: Vec<String>,
    /// Every well-known short name, true when one of its identifiers is present.
    pub named: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl CapabilitySet {
    pub fn from_features(
        features: Vec<String>,
        client_name: Option<String>,
        hash: Option<String>,
    ) -> Self {
        let mut builder = CapabilitySetBuilder::new();
        builder.extend(features);
        builder.client_name(client_name).hash(hash).build()
    }

    /// Look up a short name from the feature table. Unknown names are false.
    pub fn supports(&self, name: &str) -> bool {
        self.named.get(name).copied().unwrap_or(false)
    }
}

/// Builds a new `CapabilitySet` from raw features without touching the value
/// it was seeded from. Used to merge extension data into a cached main set.
#[derive(Debug, Default)]
pub struct CapabilitySetBuilder {
    features: Vec<String>,
    seen: HashSet<String>,
    client_name: Option<String>,
    hash: Option<String>,
}

impl CapabilitySetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a copy of an existing set's raw data.
    pub fn from_set(base: &CapabilitySet) -> Self {
        let mut builder = Self::new();
        builder.extend(base.features.iter().cloned());
        builder.client_name = base.client_name.clone();
        builder.hash = base.hash.clone();
        builder
    }

    /// Append features, skipping any already present.
    pub fn extend<I, S>(&mut self, features: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for feature in features {
            let feature = feature.into();
            if self.seen.insert(feature.clone()) {
                self.features.push(feature);
            }
        }
        self
    }

    pub fn client_name(&mut self, name: Option<String>) -> &mut Self {
        self.client_name = name;
        self
    }

    pub fn hash(&mut self, hash: Option<String>) -> &mut Self {
        self.hash = hash;
        self
    }

    pub fn has_hash(&self) -> bool {
        self.hash.is_some()
    }

    pub fn build(&self) -> CapabilitySet {
        CapabilitySet {
            named: translate_features(&self.features),
            features: self.features.clone(),
            client_name: self.client_name.clone(),
            hash: self.hash.clone(),
        }
    }
}

/// Published once per announcement cycle, when every piece of data the
/// peer advertised is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCapabilitiesResolved {
    pub peer: PeerId,
    pub capabilities: CapabilitySet,
}
