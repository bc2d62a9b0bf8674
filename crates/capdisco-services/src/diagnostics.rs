//! Diagnostics — counts what the coordinator discarded or gave up on.
//!
//! Discarded responses and starved peers never reach the application, so
//! this is the only place they show up besides the log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    queries_sent: AtomicU64,
    requests_coalesced: AtomicU64,
    responses_discarded: AtomicU64,
    remote_errors: AtomicU64,
    transport_failures: AtomicU64,
    timeouts: AtomicU64,
    retries: AtomicU64,
    peers_starved: AtomicU64,
    peers_resolved: AtomicU64,
}

/// Shared counter handle. Clones observe the same counters.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryDiagnostics {
    counters: Arc<Counters>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub queries_sent: u64,
    pub requests_coalesced: u64,
    pub responses_discarded: u64,
    pub remote_errors: u64,
    pub transport_failures: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub peers_starved: u64,
    pub peers_resolved: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl DiscoveryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query_sent(&self) {
        bump(&self.counters.queries_sent, 1);
    }

    pub fn record_coalesced(&self) {
        bump(&self.counters.requests_coalesced, 1);
    }

    pub fn record_discarded(&self) {
        bump(&self.counters.responses_discarded, 1);
    }

    pub fn record_remote_error(&self) {
        bump(&self.counters.remote_errors, 1);
    }

    pub fn record_transport_failure(&self) {
        bump(&self.counters.transport_failures, 1);
    }

    pub fn record_timeout(&self) {
        bump(&self.counters.timeouts, 1);
    }

    pub fn record_retry(&self) {
        bump(&self.counters.retries, 1);
    }

    pub fn record_starved(&self, peers: usize) {
        bump(&self.counters.peers_starved, peers as u64);
    }

    pub fn record_resolved(&self) {
        bump(&self.counters.peers_resolved, 1);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let c = &self.counters;
        DiagnosticsSnapshot {
            queries_sent: c.queries_sent.load(Ordering::Relaxed),
            requests_coalesced: c.requests_coalesced.load(Ordering::Relaxed),
            responses_discarded: c.responses_discarded.load(Ordering::Relaxed),
            remote_errors: c.remote_errors.load(Ordering::Relaxed),
            transport_failures: c.transport_failures.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            peers_starved: c.peers_starved.load(Ordering::Relaxed),
            peers_resolved: c.peers_resolved.load(Ordering::Relaxed),
        }
    }

    /// Log the counters if anything has happened yet.
    pub fn log_stats(&self) {
        let s = self.snapshot();
        if s == DiagnosticsSnapshot::default() {
            return;
        }
        tracing::info!(
            queries_sent = s.queries_sent,
            coalesced = s.requests_coalesced,
            discarded = s.responses_discarded,
            remote_errors = s.remote_errors,
            transport_failures = s.transport_failures,
            timeouts = s.timeouts,
            retries = s.retries,
            starved = s.peers_starved,
            resolved = s.peers_resolved,
            "discovery stats"
        );
    }
}
