//! TCP listener and connection dispatch.
//!
//! Accepts inbound connections, dials the backend for each one and hands
//! the resulting pair to its own task. A failure on one connection never
//! stops the accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use super::backend::{dial, BackendAddr, DEFAULT_CONNECT_TIMEOUT};
use super::copier::RelayConfig;
use super::endpoint::{Endpoint, Role};
use super::pair::handle_pair;
use super::stats::ProxyStats;
use crate::error::ProxyError;

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Where every accepted connection is forwarded.
    pub backend: BackendAddr,
    /// Bound on resolving and connecting to the backend.
    pub connect_timeout: Duration,
    /// Settings handed to every pair.
    pub relay: RelayConfig,
}

impl ListenerConfig {
    pub fn new(bind_addr: SocketAddr, backend: BackendAddr) -> Self {
        Self {
            bind_addr,
            backend,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            relay: RelayConfig::default(),
        }
    }
}

/// The inbound listener.
pub struct Listener {
    config: ListenerConfig,
    listener: TcpListener,
    stats: Arc<ProxyStats>,
}

impl Listener {
    /// Bind the inbound socket.
    ///
    /// Failure here is the only listener error that stops the process.
    pub async fn bind(config: ListenerConfig, stats: Arc<ProxyStats>) -> Result<Self, ProxyError> {
        let bind_err = |source| ProxyError::Bind {
            addr: config.bind_addr,
            source,
        };
        let listener = TcpListener::bind(config.bind_addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!(
            bind_addr = %local_addr,
            backend = %config.backend,
            mode = %config.relay.mode,
            buffer_size = config.relay.buffer_size,
            "Listener bound"
        );

        Ok(Self {
            config,
            listener,
            stats,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Listener started");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(peer_addr = %peer_addr, "Connection accepted");
                    self.dispatch(stream, peer_addr).await;
                }
                Err(e) => {
                    self.stats.accept_failed.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Dial the backend for one accepted connection and spawn its pair.
    async fn dispatch(&self, inbound: TcpStream, peer_addr: SocketAddr) {
        let dialed = match dial(&self.config.backend, self.config.connect_timeout).await {
            Ok(dialed) => dialed,
            Err(e) => {
                self.stats.backend_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    peer_addr = %peer_addr,
                    backend = %self.config.backend,
                    reason = e.reason_code(),
                    error = %e,
                    "Backend dial failed, closing inbound connection"
                );
                return;
            }
        };
        self.stats.backend_connected.fetch_add(1, Ordering::Relaxed);
        debug!(
            peer_addr = %peer_addr,
            backend_addr = %dialed.addr,
            "Connected to backend"
        );

        let inbound = Endpoint::new(inbound, Role::Inbound, peer_addr, Arc::clone(&self.stats));
        let outbound = Endpoint::new(
            dialed.stream,
            Role::Outbound,
            dialed.addr,
            Arc::clone(&self.stats),
        );

        let relay = self.config.relay.clone();
        let stats = Arc::clone(&self.stats);
        tokio::spawn(
            async move {
                handle_pair(inbound, outbound, &relay, stats).await;
            }
            .instrument(tracing::info_span!("pair", peer = %peer_addr)),
        );
    }
}
