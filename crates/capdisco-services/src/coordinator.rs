//! Discovery coordinator — turns announcements into resolved capabilities.
//!
//! Per announcement: Unresolved → awaiting main set and/or extensions →
//! Resolved (one-shot). Each handler applies one inbound event completely
//! before returning, and returns the peers that became resolved by it.
//!
//! The coordinator is single-threaded by construction (`&mut self`). The
//! daemon owns it from one task and feeds it events over a channel.

use std::time::{Duration, Instant};

use capdisco_core::{
    CapabilityAnnouncement, CapabilitySet, CapabilitySetBuilder, DiscoveryPayload,
    DiscoveryResponse, ExtensionId, PeerCapabilitiesResolved, PeerId,
};

use crate::cache::{CapabilityCache, ExtensionCache};
use crate::diagnostics::DiscoveryDiagnostics;
use crate::error::DiscoveryError;
use crate::ledger::SubscriberLedger;
use crate::tracker::{DiscoveryRequestTracker, PendingDiscovery, RequestKey, Requested};
use crate::transport::{DiscoveryTransport, TransportError};

/// What to do about queries that never get a usable answer.
///
/// The default waits forever and never resends: affected peers stay pending
/// until they announce again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Expire queries older than this. None = never.
    pub query_timeout: Option<Duration>,
    /// Resends allowed per query after the first attempt.
    pub max_retries: u32,
    /// Resend on a remote error instead of giving up.
    pub retry_on_remote_error: bool,
}

impl RetryPolicy {
    fn may_retry(&self, pending: &PendingDiscovery) -> bool {
        pending.attempts <= self.max_retries
    }
}

/// Result of one `expire_stale` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    pub expired: usize,
    pub retried: usize,
    pub starved_peers: usize,
}

pub struct DiscoveryCoordinator<T> {
    transport: T,
    policy: RetryPolicy,
    capabilities: CapabilityCache,
    extensions: ExtensionCache,
    tracker: DiscoveryRequestTracker,
    ledger: SubscriberLedger,
    diagnostics: DiscoveryDiagnostics,
}

impl<T: DiscoveryTransport> DiscoveryCoordinator<T> {
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            capabilities: CapabilityCache::new(),
            extensions: ExtensionCache::new(),
            tracker: DiscoveryRequestTracker::new(),
            ledger: SubscriberLedger::new(),
            diagnostics: DiscoveryDiagnostics::new(),
        }
    }

    // ── Inbound events ───────────────────────────────────────────────────────

    /// A peer advertised a fingerprint.
    ///
    /// Resolves immediately when everything is cached; otherwise registers
    /// the peer and requests whatever is missing.
    pub fn handle_announcement(
        &mut self,
        announcement: CapabilityAnnouncement,
    ) -> Vec<PeerCapabilitiesResolved> {
        let peer = announcement.peer.clone();
        let fingerprint = announcement.fingerprint.clone();
        let main_cached = self.capabilities.contains(&fingerprint);

        let mut missing: Vec<ExtensionId> = Vec::new();
        for ext in &announcement.extensions {
            if !self.extensions.contains(&fingerprint, ext) && !missing.contains(ext) {
                missing.push(ext.clone());
            }
        }

        if main_cached && missing.is_empty() {
            // A newer announcement supersedes any cycle still pending.
            if self.ledger.forget(&peer).is_some() {
                tracing::debug!(%peer, "pending announcement superseded");
            }
            return match self.merged_capabilities(&announcement) {
                Some(capabilities) => {
                    tracing::debug!(%peer, %fingerprint, "capabilities resolved from cache");
                    self.diagnostics.record_resolved();
                    vec![PeerCapabilitiesResolved { peer, capabilities }]
                }
                None => Vec::new(),
            };
        }

        tracing::debug!(
            %peer,
            %fingerprint,
            main_cached,
            missing_extensions = missing.len(),
            "announcement awaiting discovery"
        );
        let hash = announcement.hash.clone();
        self.ledger.register_peer(announcement);

        for ext in missing {
            self.ledger.add_outstanding_extension(&peer, ext.clone());
            let requested = self.tracker.request_extension(
                fingerprint.clone(),
                ext,
                &peer,
                peer.clone(),
                &mut self.transport,
            );
            self.note_request(requested);
        }

        if !main_cached {
            let requested = self.tracker.request_main(
                fingerprint,
                hash,
                &peer,
                peer.clone(),
                &mut self.transport,
            );
            self.note_request(requested);
        }

        Vec::new()
    }

    /// A discovery response arrived.
    ///
    /// Unknown correlation ids are discarded without touching any state.
    pub fn handle_response(
        &mut self,
        response: DiscoveryResponse,
    ) -> Vec<PeerCapabilitiesResolved> {
        let pending = match self.tracker.resolve(&response.correlation_id) {
            Ok(pending) => pending,
            Err(e) => {
                self.diagnostics.record_discarded();
                let err = DiscoveryError::from(e);
                tracing::debug!(error = %err, "discarding discovery response");
                return Vec::new();
            }
        };

        match response.payload {
            DiscoveryPayload::Features {
                features,
                client_name,
            } => self.complete(pending, features, client_name),
            DiscoveryPayload::Error { condition } => {
                self.fail(pending, condition);
                Vec::new()
            }
        }
    }

    /// Expire queries older than the policy's timeout, resending those with
    /// retries left. A no-op without a timeout.
    pub fn expire_stale(&mut self, now: Instant) -> ExpiryReport {
        let mut report = ExpiryReport::default();
        let Some(timeout) = self.policy.query_timeout else {
            return report;
        };

        for pending in self.tracker.expire(now, timeout) {
            report.expired += 1;
            self.diagnostics.record_timeout();
            tracing::debug!(
                node = %pending.token.key,
                attempts = pending.attempts,
                "discovery query timed out"
            );
            if self.policy.may_retry(&pending) && self.retry(&pending) {
                report.retried += 1;
            } else {
                report.starved_peers += self.starve(&pending, "timeout");
            }
        }
        report
    }

    // ── Response handling ────────────────────────────────────────────────────

    fn complete(
        &mut self,
        pending: PendingDiscovery,
        features: Vec<String>,
        client_name: Option<String>,
    ) -> Vec<PeerCapabilitiesResolved> {
        match &pending.token.key {
            RequestKey::Main(fingerprint) => {
                let set = CapabilitySet::from_features(features, client_name, pending.hash.clone());
                if !self.capabilities.put(fingerprint.clone(), set) {
                    tracing::debug!(
                        %fingerprint,
                        "capability set already cached, response ignored"
                    );
                }
            }
            RequestKey::Extension(fingerprint, ext) => {
                if !self.extensions.put(fingerprint.clone(), ext.clone(), features) {
                    tracing::debug!(
                        %fingerprint,
                        %ext,
                        "extension already cached, response ignored"
                    );
                }
                for waiter in &pending.waiters {
                    // A waiter that re-announced another fingerprint no
                    // longer needs this extension.
                    let same_fingerprint = self
                        .ledger
                        .get(waiter)
                        .is_some_and(|p| p.fingerprint() == fingerprint);
                    if same_fingerprint {
                        self.ledger.remove_outstanding_extension(waiter, ext);
                    }
                }
            }
        }

        let mut resolved = Vec::new();
        for waiter in &pending.waiters {
            if !self.ledger.is_fully_resolved(waiter, &self.capabilities) {
                continue;
            }
            match self.emit(waiter) {
                Ok(event) => resolved.push(event),
                Err(e) => {
                    tracing::error!(peer = %waiter, error = %e, "failed to emit resolved peer");
                    debug_assert!(false, "emit failed for {waiter}: {e}");
                }
            }
        }
        resolved
    }

    fn fail(&mut self, pending: PendingDiscovery, condition: String) {
        self.diagnostics.record_remote_error();
        let err = DiscoveryError::RemoteDiscovery {
            node: pending.token.key.query_node(),
            condition,
        };
        tracing::warn!(
            error = %err,
            target = %pending.target,
            waiters = pending.waiters.len(),
            "discovery query failed"
        );

        if self.policy.retry_on_remote_error
            && self.policy.may_retry(&pending)
            && self.retry(&pending)
        {
            return;
        }
        self.starve(&pending, "remote error");
    }

    /// Resend; false if the transport refused.
    fn retry(&mut self, pending: &PendingDiscovery) -> bool {
        match self.tracker.reissue(pending, &mut self.transport) {
            Ok(_) => {
                self.diagnostics.record_retry();
                self.diagnostics.record_query_sent();
                true
            }
            Err(e) => {
                self.diagnostics.record_transport_failure();
                tracing::warn!(node = %pending.token.key, error = %e, "discovery retry failed");
                false
            }
        }
    }

    /// Give up on a query. Its waiters stay in the ledger and resolve only if
    /// they announce again. Returns how many are still pending.
    fn starve(&mut self, pending: &PendingDiscovery, reason: &str) -> usize {
        let starved = pending
            .waiters
            .iter()
            .filter(|w| self.ledger.contains(w))
            .count();
        self.diagnostics.record_starved(starved);
        if starved > 0 {
            tracing::warn!(
                node = %pending.token.key,
                reason,
                starved,
                "discovery abandoned, waiting peers left unresolved"
            );
        }
        starved
    }

    fn note_request(&mut self, requested: Result<Requested, TransportError>) {
        match requested {
            Ok(Requested { sent: true, .. }) => self.diagnostics.record_query_sent(),
            Ok(Requested { token, sent: false }) => {
                self.diagnostics.record_coalesced();
                tracing::trace!(node = %token.key, id = %token.id, "joined in-flight query");
            }
            Err(e) => {
                self.diagnostics.record_transport_failure();
                tracing::warn!(
                    error = %DiscoveryError::from(e),
                    "discovery query not sent, peer stays pending until it announces again"
                );
            }
        }
    }

    // ── Emission ─────────────────────────────────────────────────────────────

    fn emit(&mut self, peer: &PeerId) -> Result<PeerCapabilitiesResolved, DiscoveryError> {
        let record = self
            .ledger
            .release(peer)
            .map_err(|_| DiscoveryError::DuplicateResolution(peer.clone()))?;
        let capabilities = self
            .merged_capabilities(&record.announcement)
            .ok_or_else(|| DiscoveryError::MissingCapabilities(record.fingerprint().clone()))?;

        self.diagnostics.record_resolved();
        tracing::debug!(
            %peer,
            fingerprint = %record.fingerprint(),
            features = capabilities.features.len(),
            "peer capabilities resolved"
        );
        Ok(PeerCapabilitiesResolved {
            peer: peer.clone(),
            capabilities,
        })
    }

    /// Cached main set plus every advertised extension's features,
    /// deduplicated and re-translated. Reads the caches only; the cached
    /// values are copied, never modified.
    ///
    /// None if the main set isn't cached. Extensions not yet cached are
    /// skipped.
    pub fn merged_capabilities(
        &self,
        announcement: &CapabilityAnnouncement,
    ) -> Option<CapabilitySet> {
        let fingerprint = &announcement.fingerprint;
        let base = self.capabilities.get(fingerprint)?;

        let mut builder = CapabilitySetBuilder::from_set(&base);
        for ext in &announcement.extensions {
            match self.extensions.get(fingerprint, ext) {
                Some(features) => {
                    builder.extend(features);
                }
                None => {
                    tracing::debug!(%fingerprint, %ext, "extension not cached, skipped in merge")
                }
            }
        }
        if !builder.has_hash() {
            builder.hash(announcement.hash.clone());
        }
        Some(builder.build())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn capability_cache(&self) -> &CapabilityCache {
        &self.capabilities
    }

    pub fn extension_cache(&self) -> &ExtensionCache {
        &self.extensions
    }

    pub fn diagnostics(&self) -> &DiscoveryDiagnostics {
        &self.diagnostics
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Peers still waiting on discovery.
    pub fn pending_peers(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_peer_pending(&self, peer: &PeerId) -> bool {
        self.ledger.contains(peer)
    }

    /// Queries still in flight.
    pub fn pending_queries(&self) -> usize {
        self.tracker.pending_count()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
