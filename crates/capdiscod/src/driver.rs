//! Coordinator task — owns the `DiscoveryCoordinator` and applies inbound
//! events one at a time.

use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};

use capdisco_core::config::DiscoveryConfig;
use capdisco_core::{CapabilityAnnouncement, DiscoveryResponse, PeerCapabilitiesResolved};
use capdisco_services::{DiscoveryCoordinator, DiscoveryTransport, RetryPolicy};

/// What the listener hands to the coordinator task.
#[derive(Debug)]
pub enum InboundEvent {
    Announcement(CapabilityAnnouncement),
    Response(DiscoveryResponse),
}

pub fn retry_policy(config: &DiscoveryConfig) -> RetryPolicy {
    RetryPolicy {
        query_timeout: config.query_timeout(),
        max_retries: config.max_retries,
        retry_on_remote_error: config.retry_on_remote_error,
    }
}

pub struct DiscoveryDriver<T> {
    coordinator: DiscoveryCoordinator<T>,
    inbound: mpsc::Receiver<InboundEvent>,
    resolved: broadcast::Sender<PeerCapabilitiesResolved>,
    expiry_interval: Duration,
    stats_interval: Option<Duration>,
    shutdown: broadcast::Receiver<()>,
}

impl<T: DiscoveryTransport> DiscoveryDriver<T> {
    pub fn new(
        coordinator: DiscoveryCoordinator<T>,
        inbound: mpsc::Receiver<InboundEvent>,
        resolved: broadcast::Sender<PeerCapabilitiesResolved>,
        config: &DiscoveryConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            coordinator,
            inbound,
            resolved,
            expiry_interval: config.expiry_interval(),
            stats_interval: config.stats_interval(),
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut expiry = tokio::time::interval(self.expiry_interval);
        let stats_period = self.stats_interval.unwrap_or(Duration::from_secs(3600));
        let mut stats = tokio::time::interval(stats_period);
        let log_stats = self.stats_interval.is_some();

        tracing::info!(policy = ?self.coordinator.policy(), "discovery coordinator starting");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    self.coordinator.diagnostics().log_stats();
                    tracing::info!("discovery coordinator shutting down");
                    return Ok(());
                }

                event = self.inbound.recv() => {
                    let Some(event) = event else {
                        anyhow::bail!("inbound channel closed");
                    };
                    let resolved = match event {
                        InboundEvent::Announcement(a) => self.coordinator.handle_announcement(a),
                        InboundEvent::Response(r) => self.coordinator.handle_response(r),
                    };
                    self.publish(resolved);
                }

                _ = expiry.tick() => {
                    let report = self.coordinator.expire_stale(Instant::now());
                    if report.expired > 0 {
                        tracing::debug!(
                            expired = report.expired,
                            retried = report.retried,
                            starved = report.starved_peers,
                            "expired stale discovery queries"
                        );
                    }
                }

                _ = stats.tick(), if log_stats => {
                    self.coordinator.diagnostics().log_stats();
                    tracing::debug!(
                        pending_peers = self.coordinator.pending_peers(),
                        pending_queries = self.coordinator.pending_queries(),
                        cached = self.coordinator.capability_cache().len(),
                        "coordinator state"
                    );
                }
            }
        }
    }

    fn publish(&self, resolved: Vec<PeerCapabilitiesResolved>) {
        for event in resolved {
            // No subscribers is fine; the event is still counted.
            let _ = self.resolved.send(event);
        }
    }
}

/// Log each resolved peer until shutdown.
pub async fn resolution_logger(
    mut resolved: broadcast::Receiver<PeerCapabilitiesResolved>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            r = resolved.recv() => match r {
                Ok(event) => {
                    let supported: Vec<&str> = event
                        .capabilities
                        .named
                        .iter()
                        .filter(|(_, on)| **on)
                        .map(|(name, _)| name.as_str())
                        .collect();
                    tracing::info!(
                        peer = %event.peer,
                        client = event.capabilities.client_name.as_deref().unwrap_or("-"),
                        features = event.capabilities.features.len(),
                        supported = ?supported,
                        "peer capabilities resolved"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "resolution logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}
