//! Proxy-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics shared by the listener and every connection pair.
///
/// Pipe and endpoint counters are maintained by the resource guards
/// themselves, on creation and on drop.
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Total inbound connections accepted.
    pub connections_accepted: AtomicU64,
    /// Accept calls that failed.
    pub accept_failed: AtomicU64,
    /// Backend dials that succeeded.
    pub backend_connected: AtomicU64,
    /// Backend dials that failed or timed out.
    pub backend_failed: AtomicU64,
    /// Pairs currently being relayed.
    pub pairs_active: AtomicU64,
    /// Pairs torn down.
    pub pairs_closed: AtomicU64,
    /// Bytes relayed inbound -> outbound.
    pub bytes_to_backend: AtomicU64,
    /// Bytes relayed outbound -> inbound.
    pub bytes_from_backend: AtomicU64,
    /// Pipe buffers created.
    pub pipes_created: AtomicU64,
    /// Pipe buffers currently open.
    pub pipes_open: AtomicU64,
    /// Connection endpoints closed.
    pub endpoints_closed: AtomicU64,
    /// Transient results retried by copiers.
    pub transient_retries: AtomicU64,
    /// Directions that fell back from zero-copy to buffered.
    pub zero_copy_fallbacks: AtomicU64,
}

/// Point-in-time copy of [`ProxyStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub accept_failed: u64,
    pub backend_connected: u64,
    pub backend_failed: u64,
    pub pairs_active: u64,
    pub pairs_closed: u64,
    pub bytes_to_backend: u64,
    pub bytes_from_backend: u64,
    pub pipes_created: u64,
    pub pipes_open: u64,
    pub endpoints_closed: u64,
    pub transient_retries: u64,
    pub zero_copy_fallbacks: u64,
}

impl ProxyStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            connections_accepted: load(&self.connections_accepted),
            accept_failed: load(&self.accept_failed),
            backend_connected: load(&self.backend_connected),
            backend_failed: load(&self.backend_failed),
            pairs_active: load(&self.pairs_active),
            pairs_closed: load(&self.pairs_closed),
            bytes_to_backend: load(&self.bytes_to_backend),
            bytes_from_backend: load(&self.bytes_from_backend),
            pipes_created: load(&self.pipes_created),
            pipes_open: load(&self.pipes_open),
            endpoints_closed: load(&self.endpoints_closed),
            transient_retries: load(&self.transient_retries),
            zero_copy_fallbacks: load(&self.zero_copy_fallbacks),
        }
    }
}
