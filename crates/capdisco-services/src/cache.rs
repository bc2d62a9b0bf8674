//! Content-addressed capability caches.
//!
//! A fingerprint's `ver` is a hash of its capability payload, so an entry
//! never changes once written: first write wins, later writes are no-ops.
//! No TTLs, no invalidation, no eviction.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use capdisco_core::{CapabilitySet, ExtensionId, Fingerprint};

/// Fingerprint → resolved capability set.
///
/// Cloning shares the underlying map. Only the coordinator writes to it;
/// handles given out elsewhere are read-only.
///
/// ```compile_fail
/// use capdisco_core::{CapabilitySet, Fingerprint};
/// use capdisco_services::CapabilityCache;
///
/// let cache = CapabilityCache::new();
/// let set = CapabilitySet::from_features(vec!["forged".into()], None, None);
/// cache.put(Fingerprint::new("app", "v1"), set);
/// ```
#[derive(Clone, Default)]
pub struct CapabilityCache {
    entries: Arc<DashMap<Fingerprint, CapabilitySet>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CapabilitySet> {
        self.entries.get(fingerprint).map(|e| e.clone())
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Store a set. Returns false (and changes nothing) if already cached.
    pub(crate) fn put(&self, fingerprint: Fingerprint, set: CapabilitySet) -> bool {
        match self.entries.entry(fingerprint) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                tracing::trace!(fingerprint = %slot.key(), "capability set cached");
                slot.insert(set);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// (fingerprint, extension) → raw feature list for legacy extensions.
#[derive(Clone, Default)]
pub struct ExtensionCache {
    entries: Arc<DashMap<(Fingerprint, ExtensionId), Vec<String>>>,
}

impl ExtensionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint, ext: &ExtensionId) -> Option<Vec<String>> {
        // Keyed by owned tuple; lookups clone the key parts.
        self.entries
            .get(&(fingerprint.clone(), ext.clone()))
            .map(|e| e.clone())
    }

    pub fn contains(&self, fingerprint: &Fingerprint, ext: &ExtensionId) -> bool {
        self.entries
            .contains_key(&(fingerprint.clone(), ext.clone()))
    }

    /// Store an extension's features. Returns false if already cached.
    pub(crate) fn put(
        &self,
        fingerprint: Fingerprint,
        ext: ExtensionId,
        features: Vec<String>,
    ) -> bool {
        match self.entries.entry((fingerprint, ext)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                tracing::trace!(
                    fingerprint = %slot.key().0,
                    ext = %slot.key().1,
                    "extension features cached"
                );
                slot.insert(features);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
