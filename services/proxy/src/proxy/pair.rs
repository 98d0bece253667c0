//! Connection pair handler.
//!
//! Owns one inbound endpoint and its outbound counterpart, runs both
//! directions concurrently and closes both endpoints once, after both
//! directions have terminated.
//!
//! ```text
//! ACTIVE --(first direction ends, shutdown issued)--> HALF_CLOSED
//! HALF_CLOSED --(second direction ends, endpoints dropped)--> CLOSED
//! ```
//!
//! There is no cancellation channel. A direction that ends shuts down
//! both sockets, which is how the other direction learns to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::copier::{Copier, Direction, DirectionReport, RelayConfig};
use super::endpoint::Endpoint;
use super::stats::ProxyStats;

/// Outcome of a whole pair. Both endpoints are closed by the time one exists.
#[derive(Debug, Clone)]
pub struct PairReport {
    /// Inbound -> outbound.
    pub upstream: DirectionReport,
    /// Outbound -> inbound.
    pub downstream: DirectionReport,
}

impl PairReport {
    pub fn bytes_to_backend(&self) -> u64 {
        self.upstream.bytes_written
    }

    pub fn bytes_from_backend(&self) -> u64 {
        self.downstream.bytes_written
    }
}

/// Marks ACTIVE -> HALF_CLOSED. Returns `true` for the first direction to end.
///
/// The flag is atomic only so the pair future stays `Send`.
fn direction_finished(half_closed: &AtomicBool, report: &DirectionReport) -> bool {
    let first = !half_closed.swap(true, Ordering::Relaxed);
    if first {
        debug!(
            first = %report.direction,
            reason = report.termination.reason(),
            "Pair half-closed"
        );
    }
    first
}

/// Relay a connection pair until both directions have terminated.
///
/// Both endpoints are consumed and closed exactly once before this returns,
/// whichever direction ended first and however it ended.
pub async fn handle_pair(
    inbound: Endpoint,
    outbound: Endpoint,
    config: &RelayConfig,
    stats: Arc<ProxyStats>,
) -> PairReport {
    let copier = Copier::new(config);
    let half_closed = AtomicBool::new(false);

    stats.pairs_active.fetch_add(1, Ordering::Relaxed);
    debug!(
        inbound = %inbound.peer_addr(),
        outbound = %outbound.peer_addr(),
        mode = %copier.mode(),
        "Pair started"
    );

    let upstream = async {
        let report = copier
            .run(Direction::Upstream, &inbound, &outbound, &stats)
            .await;
        direction_finished(&half_closed, &report);
        report
    };
    let downstream = async {
        let report = copier
            .run(Direction::Downstream, &outbound, &inbound, &stats)
            .await;
        direction_finished(&half_closed, &report);
        report
    };

    let (upstream, downstream) = tokio::join!(upstream, downstream);

    let inbound_addr = inbound.peer_addr();
    let outbound_addr = outbound.peer_addr();
    drop(inbound);
    drop(outbound);

    stats
        .bytes_to_backend
        .fetch_add(upstream.bytes_written, Ordering::Relaxed);
    stats
        .bytes_from_backend
        .fetch_add(downstream.bytes_written, Ordering::Relaxed);
    stats.pairs_active.fetch_sub(1, Ordering::Relaxed);
    stats.pairs_closed.fetch_add(1, Ordering::Relaxed);

    info!(
        inbound = %inbound_addr,
        outbound = %outbound_addr,
        bytes_to_backend = upstream.bytes_written,
        bytes_from_backend = downstream.bytes_written,
        upstream = upstream.termination.reason(),
        downstream = downstream.termination.reason(),
        "Pair closed"
    );

    PairReport {
        upstream,
        downstream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::copier::{CopyMode, Termination};
    use crate::proxy::endpoint::Role;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Returns (client, inbound endpoint, outbound endpoint, backend).
    async fn pair_fixture(stats: &Arc<ProxyStats>) -> (TcpStream, Endpoint, Endpoint, TcpStream) {
        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let back = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let client = TcpStream::connect(front.local_addr().unwrap()).await.unwrap();
        let (inbound, client_addr) = front.accept().await.unwrap();

        let outbound = TcpStream::connect(back.local_addr().unwrap()).await.unwrap();
        let (backend, _) = back.accept().await.unwrap();
        let backend_addr = outbound.peer_addr().unwrap();

        (
            client,
            Endpoint::new(inbound, Role::Inbound, client_addr, Arc::clone(stats)),
            Endpoint::new(outbound, Role::Outbound, backend_addr, Arc::clone(stats)),
            backend,
        )
    }

    #[test]
    fn test_only_first_direction_half_closes() {
        let half_closed = AtomicBool::new(false);
        let report = DirectionReport {
            direction: Direction::Upstream,
            mode: CopyMode::Buffered,
            bytes_read: 0,
            bytes_written: 0,
            retries: 0,
            termination: Termination::Eof,
        };

        assert!(direction_finished(&half_closed, &report));
        assert!(!direction_finished(&half_closed, &report));
    }

    #[tokio::test]
    async fn test_empty_client_closes_pair() {
        for mode in [CopyMode::select(true), CopyMode::Buffered] {
            let stats = Arc::new(ProxyStats::default());
            let (client, inbound, outbound, mut backend) = pair_fixture(&stats).await;
            drop(client);

            let report = handle_pair(
                inbound,
                outbound,
                &RelayConfig::new(1024, mode),
                Arc::clone(&stats),
            )
            .await;

            assert_eq!(report.upstream.termination, Termination::Eof);
            assert_eq!(report.downstream.termination, Termination::Eof);
            assert_eq!(report.bytes_to_backend(), 0);
            assert_eq!(report.bytes_from_backend(), 0);

            let snapshot = stats.snapshot();
            assert_eq!(snapshot.endpoints_closed, 2);
            assert_eq!(snapshot.pipes_open, 0);
            assert_eq!(snapshot.pairs_active, 0);
            assert_eq!(snapshot.pairs_closed, 1);

            let mut buf = [0u8; 4];
            assert_eq!(backend.read(&mut buf).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_backend_close_drives_pair_closed() {
        let stats = Arc::new(ProxyStats::default());
        let (mut client, inbound, outbound, mut backend) = pair_fixture(&stats).await;

        let handler = tokio::spawn({
            let stats = Arc::clone(&stats);
            async move {
                handle_pair(inbound, outbound, &RelayConfig::default(), stats).await
            }
        });

        backend.write_all(b"bye").await.unwrap();
        let mut buf = [0u8; 3];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"bye");
        drop(backend);

        let report = handler.await.unwrap();
        assert_eq!(report.downstream.termination, Termination::Eof);
        assert_eq!(report.bytes_from_backend(), 3);
        assert!(report.downstream.converged());

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(stats.snapshot().endpoints_closed, 2);
    }
}
