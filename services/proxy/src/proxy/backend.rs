//! Backend address parsing and dialing.
//!
//! The backend is a single `host:port` fixed at startup. It is resolved
//! and dialed once per accepted connection; each resolved address is tried
//! in order until one connects, all under one connect timeout.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

use crate::error::ProxyError;

/// Default connect timeout for backend connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// The forwarding target, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendAddr {
    /// Hostname or IP literal, without brackets.
    pub host: String,
    pub port: u16,
}

impl BackendAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BackendAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for BackendAddr {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| ProxyError::Config(format!("backend {s:?}: {why}"));

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '['"))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| invalid("expected host:port"))?;
            (host, port)
        } else {
            s.rsplit_once(':')
                .ok_or_else(|| invalid("expected host:port"))?
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
        if port == 0 {
            return Err(invalid("port must be nonzero"));
        }

        Ok(Self::new(host, port))
    }
}

/// A connected backend stream and the address it reached.
#[derive(Debug)]
pub struct Dialed {
    pub stream: TcpStream,
    pub addr: SocketAddr,
}

/// Resolve and connect to the backend within `connect_timeout`.
pub async fn dial(backend: &BackendAddr, connect_timeout: Duration) -> Result<Dialed, ProxyError> {
    match timeout(connect_timeout, connect_any(backend)).await {
        Ok(Ok(dialed)) => Ok(dialed),
        Ok(Err(source)) => Err(ProxyError::Dial {
            backend: backend.to_string(),
            source,
        }),
        Err(_) => Err(ProxyError::DialTimeout {
            backend: backend.to_string(),
            timeout: connect_timeout,
        }),
    }
}

async fn connect_any(backend: &BackendAddr) -> io::Result<Dialed> {
    let mut last_err = None;

    for addr in lookup_host((backend.host.as_str(), backend.port)).await? {
        debug!(backend = %backend, backend_addr = %addr, "Connecting to backend");
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(Dialed { stream, addr }),
            Err(e) => {
                debug!(backend_addr = %addr, error = %e, "Backend address failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
    }))
}
