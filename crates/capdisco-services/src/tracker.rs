//! In-flight discovery query tracking.
//!
//! At most one query is outstanding per `RequestKey`. A second request for
//! the same key joins the existing query as a waiter instead of sending.
//! Responses are matched by correlation id alone: some responders echo the
//! queried node back wrong, so the response body is never used to decide
//! which request it answers.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use capdisco_core::{CorrelationId, ExtensionId, Fingerprint, PeerId};

use crate::error::TrackerError;
use crate::transport::{DiscoveryTransport, TransportError};

/// What a query is for. The kind is carried by the tag, never by the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestKey {
    Main(Fingerprint),
    Extension(Fingerprint, ExtensionId),
}

impl RequestKey {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            RequestKey::Main(fp) | RequestKey::Extension(fp, _) => fp,
        }
    }

    pub fn extension(&self) -> Option<&ExtensionId> {
        match self {
            RequestKey::Main(_) => None,
            RequestKey::Extension(_, ext) => Some(ext),
        }
    }

    /// Node string sent to the responder.
    pub fn query_node(&self) -> String {
        match self {
            RequestKey::Main(fp) => fp.query_node(),
            RequestKey::Extension(fp, ext) => fp.extension_node(ext),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query_node())
    }
}

/// A sent query: the transport's id plus what it was asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationToken {
    pub id: CorrelationId,
    pub key: RequestKey,
}

/// One in-flight query and the peers waiting on it.
#[derive(Debug, Clone)]
pub struct PendingDiscovery {
    pub token: CorrelationToken,
    /// Peer the query was sent to.
    pub target: PeerId,
    pub waiters: BTreeSet<PeerId>,
    /// Hash tag from the announcement that triggered the query.
    pub hash: Option<String>,
    pub issued_at: Instant,
    /// Sends so far, including the first.
    pub attempts: u32,
}

/// Outcome of a request: the token to expect, and whether a query was
/// actually sent or the caller joined one already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requested {
    pub token: CorrelationToken,
    pub sent: bool,
}

#[derive(Debug, Default)]
pub struct DiscoveryRequestTracker {
    by_key: HashMap<RequestKey, PendingDiscovery>,
    by_id: HashMap<CorrelationId, RequestKey>,
}

impl DiscoveryRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a fingerprint's main capability set on behalf of `waiter`.
    pub fn request_main<T: DiscoveryTransport + ?Sized>(
        &mut self,
        fingerprint: Fingerprint,
        hash: Option<String>,
        target: &PeerId,
        waiter: PeerId,
        transport: &mut T,
    ) -> Result<Requested, TransportError> {
        self.request(RequestKey::Main(fingerprint), hash, target, waiter, transport)
    }

    /// Request one legacy extension of a fingerprint on behalf of `waiter`.
    pub fn request_extension<T: DiscoveryTransport + ?Sized>(
        &mut self,
        fingerprint: Fingerprint,
        ext: ExtensionId,
        target: &PeerId,
        waiter: PeerId,
        transport: &mut T,
    ) -> Result<Requested, TransportError> {
        self.request(RequestKey::Extension(fingerprint, ext), None, target, waiter, transport)
    }

    /// Join the pending query for `key`, or send a new one.
    ///
    /// A failed send records nothing.
    pub fn request<T: DiscoveryTransport + ?Sized>(
        &mut self,
        key: RequestKey,
        hash: Option<String>,
        target: &PeerId,
        waiter: PeerId,
        transport: &mut T,
    ) -> Result<Requested, TransportError> {
        if let Some(pending) = self.by_key.get_mut(&key) {
            pending.waiters.insert(waiter);
            return Ok(Requested {
                token: pending.token.clone(),
                sent: false,
            });
        }

        let id = transport.send_query(target, &key.query_node())?;
        tracing::debug!(node = %key, %target, id = %id, "discovery query sent");

        let pending = PendingDiscovery {
            token: CorrelationToken { id, key },
            target: target.clone(),
            waiters: BTreeSet::from([waiter]),
            hash,
            issued_at: Instant::now(),
            attempts: 1,
        };
        let token = pending.token.clone();
        self.insert(pending);
        Ok(Requested { token, sent: true })
    }

    /// Match a response to its query and end that query's lifecycle.
    pub fn resolve(&mut self, id: &CorrelationId) -> Result<PendingDiscovery, TrackerError> {
        let key = self
            .by_id
            .remove(id)
            .ok_or_else(|| TrackerError::UnknownCorrelation(id.clone()))?;
        self.by_key
            .remove(&key)
            .ok_or_else(|| TrackerError::UnknownCorrelation(id.clone()))
    }

    pub fn is_pending(&self, key: &RequestKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn get(&self, key: &RequestKey) -> Option<&PendingDiscovery> {
        self.by_key.get(key)
    }

    pub fn pending_count(&self) -> usize {
        self.by_key.len()
    }

    /// Remove and return queries issued at least `timeout` before `now`,
    /// oldest first.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<PendingDiscovery> {
        let stale: Vec<RequestKey> = self
            .by_key
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.issued_at) >= timeout)
            .map(|(k, _)| k.clone())
            .collect();

        let mut expired: Vec<PendingDiscovery> = stale
            .into_iter()
            .filter_map(|key| self.by_key.remove(&key))
            .collect();
        for pending in &expired {
            self.by_id.remove(&pending.token.id);
        }
        expired.sort_by_key(|p| p.issued_at);
        expired
    }

    /// Resend a query previously removed by `resolve` or `expire`.
    ///
    /// The waiters carry over and the attempt count goes up. If another
    /// query for the same key went out in the meantime, the waiters join it
    /// and nothing is sent.
    pub fn reissue<T: DiscoveryTransport + ?Sized>(
        &mut self,
        previous: &PendingDiscovery,
        transport: &mut T,
    ) -> Result<CorrelationToken, TransportError> {
        let key = previous.token.key.clone();
        if let Some(pending) = self.by_key.get_mut(&key) {
            pending.waiters.extend(previous.waiters.iter().cloned());
            return Ok(pending.token.clone());
        }

        let id = transport.send_query(&previous.target, &key.query_node())?;
        tracing::debug!(
            node = %key,
            target = %previous.target,
            id = %id,
            attempt = previous.attempts + 1,
            "discovery query resent"
        );

        let pending = PendingDiscovery {
            token: CorrelationToken { id, key },
            target: previous.target.clone(),
            waiters: previous.waiters.clone(),
            hash: previous.hash.clone(),
            issued_at: Instant::now(),
            attempts: previous.attempts + 1,
        };
        let token = pending.token.clone();
        self.insert(pending);
        Ok(token)
    }

    fn insert(&mut self, pending: PendingDiscovery) {
        let id = pending.token.id.clone();
        if let Some(stale) = self.by_id.insert(id.clone(), pending.token.key.clone()) {
            // Transport reused an id; the older query can no longer be matched.
            tracing::warn!(%id, node = %stale, "transport reused a correlation id");
            self.by_key.remove(&stale);
        }
        self.by_key.insert(pending.token.key.clone(), pending);
    }
}
