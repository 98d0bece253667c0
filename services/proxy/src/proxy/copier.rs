//! Directional copier: one direction of a pair, zero-copy or buffered.
//!
//! Both variants share one contract. They move bytes from `source` to
//! `dest` until end-of-stream or a terminal error, then shut down both
//! endpoints. The shutdown is what wakes the opposite direction, which
//! then sees its own source at end-of-stream or its destination closed.

use std::fmt;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use sproxy_splice::{ErrorClass, Stage};
use tracing::{debug, info, warn};

use super::buffered;
use super::endpoint::Endpoint;
use super::stats::ProxyStats;
use crate::error::ProxyError;

/// Default bytes moved per splice or read call.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Default progress log interval in bytes.
pub const DEFAULT_PROGRESS_BYTES: u64 = 1024 * 1024;

/// How a direction moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// `splice(2)` through a private pipe.
    ZeroCopy,
    /// Read into a user-space buffer, then write.
    Buffered,
}

impl CopyMode {
    /// Pick the mode for a zero-copy request on this platform.
    pub fn select(zero_copy: bool) -> Self {
        if zero_copy && sproxy_splice::SUPPORTED {
            CopyMode::ZeroCopy
        } else {
            CopyMode::Buffered
        }
    }
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyMode::ZeroCopy => write!(f, "zero_copy"),
            CopyMode::Buffered => write!(f, "buffered"),
        }
    }
}

/// Per-pair relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upper bound on bytes moved per call.
    pub buffer_size: usize,
    /// Copier variant used for both directions.
    pub mode: CopyMode,
    /// Log a progress line every this many bytes; 0 disables.
    pub progress_every: u64,
}

impl RelayConfig {
    pub fn new(buffer_size: usize, mode: CopyMode) -> Self {
        Self {
            buffer_size,
            mode,
            progress_every: DEFAULT_PROGRESS_BYTES,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, CopyMode::select(true))
    }
}

/// One unidirectional stream within a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Inbound -> outbound (client to backend).
    Upstream,
    /// Outbound -> inbound (backend to client).
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "inbound->outbound"),
            Direction::Downstream => write!(f, "outbound->inbound"),
        }
    }
}

/// Why a direction stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Source reached end-of-stream.
    Eof,
    /// A descriptor was shut down or reset, usually by the other direction.
    PeerClosed { detail: String },
    /// Unexpected failure.
    Error { detail: String },
}

impl Termination {
    pub(crate) fn from_io(stage: Stage, source: io::Error) -> Self {
        let class = ErrorClass::of_io(&source);
        let detail = ProxyError::Copy { stage, source }.to_string();
        match class {
            ErrorClass::Closed => Termination::PeerClosed { detail },
            ErrorClass::Transient | ErrorClass::Fatal => Termination::Error { detail },
        }
    }

    /// End-of-stream and peer closes are normal ways for a direction to end.
    pub fn is_benign(&self) -> bool {
        !matches!(self, Termination::Error { .. })
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Termination::Eof => "eof",
            Termination::PeerClosed { .. } => "peer_closed",
            Termination::Error { .. } => "error",
        }
    }
}

/// Outcome of one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionReport {
    pub direction: Direction,
    /// Mode actually used, after any fallback.
    pub mode: CopyMode,
    /// Bytes taken from the source.
    pub bytes_read: u64,
    /// Bytes delivered to the destination.
    pub bytes_written: u64,
    /// Transient results retried.
    pub retries: u64,
    pub termination: Termination,
}

impl DirectionReport {
    /// Read and write sides agree.
    pub fn converged(&self) -> bool {
        self.bytes_read == self.bytes_written
    }
}

/// Running byte counters for one direction.
pub(crate) struct Tally {
    direction: Direction,
    progress_every: u64,
    next_mark: u64,
    pub(crate) read: u64,
    pub(crate) written: u64,
    pub(crate) retries: u64,
}

impl Tally {
    fn new(direction: Direction, progress_every: u64) -> Self {
        Self {
            direction,
            progress_every,
            next_mark: progress_every,
            read: 0,
            written: 0,
            retries: 0,
        }
    }

    pub(crate) fn record_read(&mut self, n: usize) {
        self.read += n as u64;
    }

    pub(crate) fn record_written(&mut self, n: usize) {
        self.written += n as u64;

        if self.progress_every > 0 && self.written >= self.next_mark {
            debug!(
                direction = %self.direction,
                bytes_read = self.read,
                bytes_written = self.written,
                "Direction progress"
            );
            self.next_mark = (self.written / self.progress_every + 1) * self.progress_every;
        }
    }

    pub(crate) fn retried(&mut self) {
        self.retries += 1;
    }
}

/// Runs one direction with the configured variant.
///
/// The pair handler never needs to know which variant is in use.
#[derive(Debug, Clone)]
pub struct Copier {
    mode: CopyMode,
    buffer_size: usize,
    progress_every: u64,
}

impl Copier {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            mode: config.mode,
            buffer_size: config.buffer_size.max(1),
            progress_every: config.progress_every,
        }
    }

    pub fn mode(&self) -> CopyMode {
        self.mode
    }

    /// Relay `source` into `dest` until the direction terminates.
    ///
    /// On return any pipe used has been released and both endpoints have
    /// been shut down.
    pub async fn run(
        &self,
        direction: Direction,
        source: &Endpoint,
        dest: &Endpoint,
        stats: &Arc<ProxyStats>,
    ) -> DirectionReport {
        debug!(
            direction = %direction,
            mode = %self.mode,
            from = %source.peer_addr(),
            to = %dest.peer_addr(),
            buffer_size = self.buffer_size,
            "Direction started"
        );

        let mut tally = Tally::new(direction, self.progress_every);
        let (mode, termination) = match self.mode {
            CopyMode::ZeroCopy => self.run_zero_copy(source, dest, stats, &mut tally).await,
            CopyMode::Buffered => (
                CopyMode::Buffered,
                buffered::run(source, dest, self.buffer_size, &mut tally).await,
            ),
        };

        source.shutdown();
        dest.shutdown();

        stats
            .transient_retries
            .fetch_add(tally.retries, Ordering::Relaxed);

        let report = DirectionReport {
            direction,
            mode,
            bytes_read: tally.read,
            bytes_written: tally.written,
            retries: tally.retries,
            termination,
        };

        match &report.termination {
            Termination::Error { detail } => warn!(
                direction = %direction,
                mode = %mode,
                bytes_read = report.bytes_read,
                bytes_written = report.bytes_written,
                reason = report.termination.reason(),
                error = %detail,
                "Direction failed"
            ),
            termination => info!(
                direction = %direction,
                mode = %mode,
                bytes_read = report.bytes_read,
                bytes_written = report.bytes_written,
                retries = report.retries,
                reason = termination.reason(),
                "Direction finished"
            ),
        }

        report
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    async fn run_zero_copy(
        &self,
        source: &Endpoint,
        dest: &Endpoint,
        stats: &Arc<ProxyStats>,
        tally: &mut Tally,
    ) -> (CopyMode, Termination) {
        use super::zero_copy::{self, Outcome};

        match zero_copy::run(source, dest, self.buffer_size, stats, tally).await {
            Outcome::Finished(termination) => (CopyMode::ZeroCopy, termination),
            Outcome::Unsupported(errno) => {
                stats.zero_copy_fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    from = %source.peer_addr(),
                    to = %dest.peer_addr(),
                    error = %errno,
                    "Zero-copy unavailable, falling back to buffered copy"
                );
                (
                    CopyMode::Buffered,
                    buffered::run(source, dest, self.buffer_size, tally).await,
                )
            }
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    async fn run_zero_copy(
        &self,
        source: &Endpoint,
        dest: &Endpoint,
        stats: &Arc<ProxyStats>,
        tally: &mut Tally,
    ) -> (CopyMode, Termination) {
        stats.zero_copy_fallbacks.fetch_add(1, Ordering::Relaxed);
        (
            CopyMode::Buffered,
            buffered::run(source, dest, self.buffer_size, tally).await,
        )
    }
}
