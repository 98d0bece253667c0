//! Zero-copy L4 TCP forwarding.
//!
//! This module provides:
//! - The inbound listener and per-connection dispatch
//! - Backend dialing with a connect timeout
//! - The connection pair handler and its lifecycle
//! - Directional copiers, zero-copy and buffered
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> dial Backend -> handle_pair
//!                                         |-- Copier (inbound -> outbound)
//!                                         |-- Copier (outbound -> inbound)
//!
//! zero-copy direction:  source --splice--> pipe --splice--> dest
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use sproxy::proxy::{Listener, ListenerConfig, ProxyStats};
//!
//! let config = ListenerConfig::new("0.0.0.0:8081".parse()?, "localhost:3306".parse()?);
//! let listener = Arc::new(Listener::bind(config, Arc::new(ProxyStats::default())).await?);
//! listener.run().await?;
//! ```

mod backend;
mod buffered;
mod copier;
mod endpoint;
mod listener;
mod pair;
mod stats;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod zero_copy;

pub use backend::{dial, BackendAddr, Dialed, DEFAULT_CONNECT_TIMEOUT};
pub use copier::{
    Copier, CopyMode, Direction, DirectionReport, RelayConfig, Termination,
    DEFAULT_BUFFER_SIZE, DEFAULT_PROGRESS_BYTES,
};
pub use endpoint::{Endpoint, Role};
pub use listener::{Listener, ListenerConfig};
pub use pair::{handle_pair, PairReport};
pub use stats::{ProxyStats, StatsSnapshot};
