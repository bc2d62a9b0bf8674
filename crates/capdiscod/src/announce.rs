//! Own-fingerprint announcements.
//!
//! Sends an `announce` frame to every configured peer on a fixed interval,
//! from the shared socket so replies and queries come back to the listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use capdisco_core::config::IdentityConfig;
use capdisco_core::wire::Frame;
use capdisco_core::{CapabilityAnnouncement, Fingerprint};

/// The frame advertising this daemon's identity. Peer identity comes from
/// the datagram source, so the announcement's own peer field is unused.
pub fn announce_frame(identity: &IdentityConfig) -> Frame {
    let announcement = CapabilityAnnouncement::new(
        "",
        Fingerprint::new(identity.node.as_str(), identity.ver.as_str()),
    )
    .with_extensions(identity.extensions.keys().map(String::as_str));
    Frame::announce(&announcement)
}

/// Announce to `targets` now and then every `every`. With no interval,
/// announces once and idles until shutdown.
pub async fn announce_loop(
    socket: Arc<UdpSocket>,
    identity: Arc<IdentityConfig>,
    targets: Vec<SocketAddr>,
    every: Option<Duration>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let bytes = announce_frame(&identity)
        .encode()
        .context("failed to encode announcement")?;

    tracing::info!(
        targets = targets.len(),
        interval_secs = every.map(|d| d.as_secs()),
        "announcer starting"
    );

    announce_all(&socket, &bytes, &targets).await;

    let Some(every) = every else {
        let _ = shutdown.recv().await;
        tracing::info!("announcer shutting down");
        return Ok(());
    };

    let start = tokio::time::Instant::now() + every;
    let mut interval = tokio::time::interval_at(start, every);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("announcer shutting down");
                return Ok(());
            }
            _ = interval.tick() => announce_all(&socket, &bytes, &targets).await,
        }
    }
}

async fn announce_all(socket: &UdpSocket, bytes: &[u8], targets: &[SocketAddr]) {
    for target in targets {
        match socket.send_to(bytes, *target).await {
            Ok(n) => tracing::trace!(%target, bytes = n, "announcement sent"),
            Err(e) => tracing::warn!(%target, error = %e, "announcement send failed"),
        }
    }
}
