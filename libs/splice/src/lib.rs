//! # sproxy-splice
//!
//! Kernel plumbing for zero-copy byte relays.
//!
//! Sockets cannot be spliced directly into each other, so every transfer
//! hops through an anonymous pipe:
//!
//! ```text
//! source fd --splice (drain)--> pipe write end | pipe read end --splice (fill)--> dest fd
//! ```
//!
//! This crate provides:
//! - [`Pipe`]: an owned pipe descriptor pair, closed exactly once on drop
//! - [`splice_nonblocking`] / [`splice_blocking`]: thin wrappers over `splice(2)`
//! - [`ErrorClass`]: transient / closed / fatal classification of errno values
//! - [`copy_file`]: a blocking file-to-file copy through a pipe
//!
//! Everything here is synchronous. Readiness handling belongs to the caller.

mod error;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod file;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod ops;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod pipe;

pub use error::{is_unsupported, ErrorClass, SpliceError, Stage};

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use file::copy_file;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use ops::{splice_blocking, splice_nonblocking};
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use pipe::{Pipe, DEFAULT_PIPE_CAPACITY};

pub use nix::errno::Errno;

/// Whether this platform has `splice(2)`.
pub const SUPPORTED: bool = cfg!(any(target_os = "linux", target_os = "android"));
