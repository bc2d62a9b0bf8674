//! Datagram listener.
//!
//! Reads frames off the shared socket. Announcements and responses are
//! forwarded to the coordinator task; queries about our own identity are
//! answered here without involving the coordinator.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use capdisco_core::config::IdentityConfig;
use capdisco_core::wire::{Frame, Inbound, MAX_FRAME_LEN};
use capdisco_core::PeerId;

use crate::driver::InboundEvent;
use crate::responder;

/// Receive frames until shutdown or until the coordinator goes away.
pub async fn listener_loop(
    socket: Arc<UdpSocket>,
    identity: Arc<IdentityConfig>,
    inbound: mpsc::Sender<InboundEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_FRAME_LEN];

    tracing::info!(addr = %socket.local_addr()?, "discovery listener starting");

    loop {
        let (len, from) = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("discovery listener shutting down");
                return Ok(());
            }
            r = socket.recv_from(&mut buf) => match r {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "recv_from failed");
                    continue;
                }
            },
        };

        let frame = match Frame::decode(&buf[..len]) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(%from, error = %e, "dropping undecodable datagram");
                continue;
            }
        };

        let event = match frame.into_inbound(PeerId::new(from.to_string())) {
            Inbound::Query { id, node } => {
                reply(&socket, from, responder::answer(&identity, id, &node)).await;
                continue;
            }
            Inbound::Announcement(announcement) => {
                tracing::debug!(
                    peer = %announcement.peer,
                    fingerprint = %announcement.fingerprint,
                    "announcement received"
                );
                InboundEvent::Announcement(announcement)
            }
            Inbound::Response(response) => InboundEvent::Response(response),
        };

        if inbound.send(event).await.is_err() {
            anyhow::bail!("coordinator channel closed");
        }
    }
}

async fn reply(socket: &UdpSocket, to: SocketAddr, frame: Frame) {
    let bytes = match frame.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(%to, error = %e, "failed to encode reply");
            return;
        }
    };
    if let Err(e) = socket.send_to(&bytes, to).await {
        tracing::warn!(%to, error = %e, "reply send failed");
    }
}

/// Create the daemon's UDP socket. An unspecified IPv6 address binds
/// dual-stack so IPv4 peers can reach us too.
pub fn make_socket(bind: SocketAddr) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))
        .context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    if let SocketAddr::V6(v6) = bind {
        socket
            .set_only_v6(*v6.ip() != Ipv6Addr::UNSPECIFIED)
            .context("IPV6_V6ONLY")?;
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&bind.into())
        .with_context(|| format!("bind({bind})"))?;

    Ok(socket.into())
}
