//! sproxy - zero-copy TCP forwarding proxy.
//!
//! Accepts TCP connections and relays each one to a fixed backend. Bytes
//! move socket -> pipe -> socket with `splice(2)` where the kernel allows
//! it, and through a user-space buffer otherwise.

pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;

pub use error::ProxyError;
pub use proxy::{
    handle_pair, BackendAddr, Copier, CopyMode, Direction, DirectionReport, Endpoint, Listener,
    ListenerConfig, PairReport, ProxyStats, RelayConfig, Role, StatsSnapshot, Termination,
};
