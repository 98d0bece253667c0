//! Proxy configuration.
//!
//! Every flag can also be set from an `SPROXY_*` environment variable.
//! [`Config::from_cli`] validates once at startup.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::error::ProxyError;
use crate::logging::LogFormat;
use crate::proxy::{
    BackendAddr, CopyMode, ListenerConfig, RelayConfig, DEFAULT_BUFFER_SIZE,
    DEFAULT_PROGRESS_BYTES,
};

/// splice-proxy - forward TCP connections to a fixed backend with zero-copy splice.
#[derive(Debug, Clone, Parser)]
#[command(name = "splice-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Inbound bind host (IP address).
    #[arg(long, env = "SPROXY_LISTEN_HOST", default_value = "0.0.0.0")]
    pub listen_host: String,

    /// Inbound listen port.
    #[arg(long, env = "SPROXY_IN_PORT", default_value_t = 8081)]
    pub in_port: u16,

    /// Backend to forward to, as host:port.
    #[arg(long, env = "SPROXY_BACKEND", default_value = "localhost:3306")]
    pub backend: String,

    /// Upper bound on bytes moved per splice or read call.
    #[arg(long, env = "SPROXY_BUFFER_SIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Use zero-copy splice when the platform supports it.
    #[arg(
        long,
        env = "SPROXY_SPLICE",
        default_value_t = true,
        action = ArgAction::Set,
        value_name = "BOOL"
    )]
    pub splice: bool,

    /// Backend connect timeout in milliseconds.
    #[arg(long, env = "SPROXY_CONNECT_TIMEOUT_MS", default_value_t = 2000)]
    pub connect_timeout_ms: u64,

    /// Log a progress line every this many bytes per direction (0 disables).
    #[arg(long, env = "SPROXY_PROGRESS_BYTES", default_value_t = DEFAULT_PROGRESS_BYTES)]
    pub progress_bytes: u64,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, env = "SPROXY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "SPROXY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

/// Validated proxy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub backend: BackendAddr,
    pub connect_timeout: Duration,
    pub relay: RelayConfig,
    /// Whether zero-copy was asked for, before platform selection.
    pub splice_requested: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Validate parsed flags.
    pub fn from_cli(cli: Cli) -> Result<Self, ProxyError> {
        let host: IpAddr = cli.listen_host.parse().map_err(|_| {
            ProxyError::Config(format!(
                "listen host {:?} is not an IP address",
                cli.listen_host
            ))
        })?;

        if cli.buffer_size == 0 {
            return Err(ProxyError::Config(
                "buffer size must be at least 1".to_string(),
            ));
        }

        let backend: BackendAddr = cli.backend.parse()?;

        let relay = RelayConfig {
            buffer_size: cli.buffer_size,
            mode: CopyMode::select(cli.splice),
            progress_every: cli.progress_bytes,
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, cli.in_port),
            backend,
            connect_timeout: Duration::from_millis(cli.connect_timeout_ms),
            relay,
            splice_requested: cli.splice,
            log_level: cli.log_level,
            log_format: cli.log_format,
        })
    }

    /// Zero-copy was requested but the platform cannot provide it.
    pub fn splice_degraded(&self) -> bool {
        self.splice_requested && self.relay.mode == CopyMode::Buffered
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind_addr: self.bind_addr,
            backend: self.backend.clone(),
            connect_timeout: self.connect_timeout,
            relay: self.relay.clone(),
        }
    }
}
