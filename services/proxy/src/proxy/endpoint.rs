//! Connection endpoint with close-once and shutdown-once semantics.

use std::fmt;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::socket::{self, Shutdown};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use super::stats::ProxyStats;

/// Which side of a pair an endpoint sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted from a client.
    Inbound,
    /// Dialed to the backend.
    Outbound,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Inbound => write!(f, "inbound"),
            Role::Outbound => write!(f, "outbound"),
        }
    }
}

/// An open stream socket owned by exactly one connection pair.
///
/// The descriptor is closed when the endpoint is dropped, which can only
/// happen once. [`Endpoint::shutdown`] may be called from both directions
/// of a pair; only the first call reaches the kernel.
pub struct Endpoint {
    stream: TcpStream,
    role: Role,
    peer_addr: SocketAddr,
    shut_down: AtomicBool,
    stats: Arc<ProxyStats>,
}

impl Endpoint {
    pub fn new(
        stream: TcpStream,
        role: Role,
        peer_addr: SocketAddr,
        stats: Arc<ProxyStats>,
    ) -> Self {
        Self {
            stream,
            role,
            peer_addr,
            shut_down: AtomicBool::new(false),
            stats,
        }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Shut the socket down in both directions.
    ///
    /// Returns `true` if this call issued the shutdown, `false` if an
    /// earlier call already had. Kernel errors are logged, never returned:
    /// by the time a pair shuts down, the peer may already be gone.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            trace!(role = %self.role, peer_addr = %self.peer_addr, "Endpoint already shut down");
            return false;
        }

        match socket::shutdown(self.stream.as_raw_fd(), Shutdown::Both) {
            Ok(()) => {
                debug!(role = %self.role, peer_addr = %self.peer_addr, "Endpoint shut down");
            }
            Err(Errno::ENOTCONN) => {
                debug!(
                    role = %self.role,
                    peer_addr = %self.peer_addr,
                    "Endpoint peer already disconnected"
                );
            }
            Err(errno) => {
                warn!(
                    role = %self.role,
                    peer_addr = %self.peer_addr,
                    error = %errno,
                    "Endpoint shutdown failed"
                );
            }
        }
        true
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("role", &self.role)
            .field("peer_addr", &self.peer_addr)
            .field("fd", &self.stream.as_raw_fd())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.stats.endpoints_closed.fetch_add(1, Ordering::Relaxed);
        trace!(role = %self.role, peer_addr = %self.peer_addr, "Endpoint closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn connected() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, peer_addr) = listener.accept().await.unwrap();
        (client, server, peer_addr)
    }

    #[tokio::test]
    async fn test_shutdown_reaches_kernel_once() {
        let stats = Arc::new(ProxyStats::default());
        let (mut client, server, peer_addr) = connected().await;
        let endpoint = Endpoint::new(server, Role::Inbound, peer_addr, Arc::clone(&stats));

        assert!(endpoint.shutdown());
        assert!(!endpoint.shutdown());
        assert!(endpoint.is_shut_down());

        // The client observes end-of-stream once the socket is shut down.
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_counts_close() {
        let stats = Arc::new(ProxyStats::default());
        let (_client, server, peer_addr) = connected().await;
        let endpoint = Endpoint::new(server, Role::Outbound, peer_addr, Arc::clone(&stats));

        assert_eq!(endpoint.role(), Role::Outbound);
        assert_eq!(stats.endpoints_closed.load(Ordering::Relaxed), 0);
        drop(endpoint);
        assert_eq!(stats.endpoints_closed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Inbound.to_string(), "inbound");
        assert_eq!(Role::Outbound.to_string(), "outbound");
    }
}
