//! capdiscod — capability discovery daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use capdisco_core::config::CapdiscoConfig;
use capdisco_core::PeerCapabilitiesResolved;
use capdisco_services::DiscoveryCoordinator;

mod announce;
mod driver;
mod listener;
mod responder;
mod transport;

use driver::{DiscoveryDriver, InboundEvent};
use transport::UdpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CapdiscoConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CapdiscoConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CapdiscoConfig::default()
    });

    let bind = SocketAddr::new(config.network.bind_addr, config.network.port);
    let std_socket = listener::make_socket(bind).context("failed to create discovery socket")?;
    let query_socket = std_socket
        .try_clone()
        .context("failed to clone discovery socket")?;
    let socket = Arc::new(
        UdpSocket::from_std(std_socket).context("failed to convert to tokio UdpSocket")?,
    );
    tracing::info!(
        addr = %socket.local_addr()?,
        node = %config.identity.node,
        ver = %config.identity.ver,
        "capdiscod starting"
    );

    let identity = Arc::new(config.identity.clone());
    let coordinator = DiscoveryCoordinator::with_policy(
        UdpTransport::new(query_socket),
        driver::retry_policy(&config.discovery),
    );

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(1024);
    let (resolved_tx, _) = broadcast::channel::<PeerCapabilitiesResolved>(256);

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let logger_task = tokio::spawn(driver::resolution_logger(
        resolved_tx.subscribe(),
        shutdown_tx.subscribe(),
    ));

    let driver_task = tokio::spawn(
        DiscoveryDriver::new(
            coordinator,
            inbound_rx,
            resolved_tx,
            &config.discovery,
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let listener_task = tokio::spawn(listener::listener_loop(
        socket.clone(),
        identity.clone(),
        inbound_tx,
        shutdown_tx.subscribe(),
    ));

    let announce_task = tokio::spawn(announce::announce_loop(
        socket,
        identity,
        config.network.announce_to.clone(),
        config.network.announce_interval(),
        shutdown_tx.subscribe(),
    ));

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = driver_task         => tracing::error!("coordinator task exited: {:?}", r),
        r = listener_task       => tracing::error!("listener task exited: {:?}", r),
        r = announce_task       => tracing::error!("announce task exited: {:?}", r),
        r = logger_task         => tracing::error!("resolution logger exited: {:?}", r),
    }

    Ok(())
}
