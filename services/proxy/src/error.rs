//! Error types for the proxy.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use sproxy_splice::{SpliceError, Stage};
use thiserror::Error;

/// Proxy errors with standardized reason codes.
///
/// Only [`ProxyError::Bind`] and [`ProxyError::Config`] may stop the
/// process. Everything else is scoped to one connection pair.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Could not bind the inbound listener.
    #[error("bind_failed: {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Could not connect to the backend.
    #[error("dial_failed: {backend}: {source}")]
    Dial {
        backend: String,
        #[source]
        source: io::Error,
    },

    /// Backend connect did not finish in time.
    #[error("dial_timeout: {backend} after {timeout:?}")]
    DialTimeout { backend: String, timeout: Duration },

    /// Could not set up the intermediate pipe.
    #[error("pipe_failed: {0}")]
    Pipe(#[from] SpliceError),

    /// A copy stage failed.
    #[error("copy_failed: {stage}: {source}")]
    Copy {
        stage: Stage,
        #[source]
        source: io::Error,
    },

    /// Startup configuration is invalid.
    #[error("config_invalid: {0}")]
    Config(String),
}

impl ProxyError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ProxyError::Bind { .. } => "bind_failed",
            ProxyError::Dial { .. } => "dial_failed",
            ProxyError::DialTimeout { .. } => "dial_timeout",
            ProxyError::Pipe(_) => "pipe_failed",
            ProxyError::Copy { .. } => "copy_failed",
            ProxyError::Config(_) => "config_invalid",
        }
    }

    /// Whether this error must stop the whole service.
    pub fn is_process_fatal(&self) -> bool {
        matches!(self, ProxyError::Bind { .. } | ProxyError::Config(_))
    }
}
