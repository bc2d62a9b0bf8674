//! Per-peer readiness tracking.
//!
//! A peer enters the ledger when its announcement can't be resolved from
//! cache, and leaves it exactly once: through `release` when it is emitted,
//! or `forget` when a newer announcement resolved on the fast path.

use std::collections::{BTreeSet, HashMap};

use capdisco_core::{CapabilityAnnouncement, ExtensionId, Fingerprint, PeerId};

use crate::cache::CapabilityCache;
use crate::error::LedgerError;

/// A peer whose announcement is waiting on discovery.
#[derive(Debug, Clone)]
pub struct PendingPeer {
    /// The announcement that will be used for emission.
    pub announcement: CapabilityAnnouncement,
    /// Extensions not yet cached under the announced fingerprint.
    pub outstanding: BTreeSet<ExtensionId>,
}

impl PendingPeer {
    fn new(announcement: CapabilityAnnouncement) -> Self {
        Self {
            announcement,
            outstanding: BTreeSet::new(),
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.announcement.peer
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.announcement.fingerprint
    }
}

#[derive(Debug, Default)]
pub struct SubscriberLedger {
    peers: HashMap<PeerId, PendingPeer>,
}

impl SubscriberLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the peer's record, or refresh it with a newer announcement.
    ///
    /// A refresh clears the outstanding set; the caller re-adds whatever
    /// the new announcement still lacks.
    pub fn register_peer(&mut self, announcement: CapabilityAnnouncement) -> &mut PendingPeer {
        let peer = announcement.peer.clone();
        let record = self
            .peers
            .entry(peer)
            .or_insert_with(|| PendingPeer::new(announcement.clone()));
        record.announcement = announcement;
        record.outstanding.clear();
        record
    }

    /// Returns false if the peer is not pending.
    pub fn add_outstanding_extension(&mut self, peer: &PeerId, ext: ExtensionId) -> bool {
        match self.peers.get_mut(peer) {
            Some(record) => {
                record.outstanding.insert(ext);
                true
            }
            None => false,
        }
    }

    /// Returns true if the extension was outstanding for this peer.
    pub fn remove_outstanding_extension(&mut self, peer: &PeerId, ext: &ExtensionId) -> bool {
        self.peers
            .get_mut(peer)
            .map(|record| record.outstanding.remove(ext))
            .unwrap_or(false)
    }

    /// The main set for the peer's current fingerprint is cached and no
    /// extension is outstanding. False for peers not in the ledger.
    pub fn is_fully_resolved(&self, peer: &PeerId, cache: &CapabilityCache) -> bool {
        self.peers
            .get(peer)
            .map(|record| record.outstanding.is_empty() && cache.contains(record.fingerprint()))
            .unwrap_or(false)
    }

    /// Remove the peer for emission. Fails if it was already released.
    pub fn release(&mut self, peer: &PeerId) -> Result<PendingPeer, LedgerError> {
        self.peers
            .remove(peer)
            .ok_or_else(|| LedgerError::NotPending(peer.clone()))
    }

    /// Drop the peer without emitting it.
    pub fn forget(&mut self, peer: &PeerId) -> Option<PendingPeer> {
        self.peers.remove(peer)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PendingPeer> {
        self.peers.get(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
