//! Error types and errno classification.

use std::fmt;
use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Which half of a pipe hop an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Source descriptor into the pipe's write end.
    Drain,
    /// Pipe's read end into the destination descriptor.
    Fill,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Drain => write!(f, "drain"),
            Stage::Fill => write!(f, "fill"),
        }
    }
}

/// Errors raised by the splice plumbing.
#[derive(Debug, Error)]
pub enum SpliceError {
    /// Could not allocate the intermediate pipe.
    #[error("pipe creation failed: {0}")]
    Pipe(#[source] Errno),

    /// A splice call failed with a non-transient errno.
    #[error("splice {stage} failed: {source}")]
    Splice {
        stage: Stage,
        #[source]
        source: Errno,
    },

    /// The pipe reported end-of-data while bytes were still staged.
    #[error("pipe drained early: {pending} staged bytes missing")]
    ShortPipe { pending: usize },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl SpliceError {
    /// The errno behind this error, if there is one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            SpliceError::Pipe(errno) => Some(*errno),
            SpliceError::Splice { source, .. } => Some(*source),
            SpliceError::ShortPipe { .. } => None,
            SpliceError::Io(err) => err.raw_os_error().map(Errno::from_raw),
        }
    }
}

/// How a failed syscall should be handled by a copy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the same operation (`EAGAIN`, `EINTR`).
    Transient,
    /// The descriptor or its peer is gone. Benign termination.
    Closed,
    /// Anything else. Terminates the owning direction.
    Fatal,
}

impl ErrorClass {
    /// Classify a raw errno.
    pub fn of_errno(errno: Errno) -> Self {
        match errno {
            Errno::EAGAIN | Errno::EINTR => ErrorClass::Transient,
            Errno::EBADF
            | Errno::EPIPE
            | Errno::ECONNRESET
            | Errno::ENOTCONN
            | Errno::ESHUTDOWN
            | Errno::ECONNABORTED => ErrorClass::Closed,
            _ => ErrorClass::Fatal,
        }
    }

    /// Classify an `io::Error`, preferring the OS error code when present.
    pub fn of_io(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return Self::of_errno(Errno::from_raw(code));
        }

        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => ErrorClass::Transient,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => ErrorClass::Closed,
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(self) -> bool {
        self == ErrorClass::Transient
    }
}

/// Errno values meaning the descriptors involved cannot be spliced at all.
///
/// Callers fall back to a buffered copy when one of these shows up before
/// any byte has moved.
pub fn is_unsupported(errno: Errno) -> bool {
    matches!(errno, Errno::EINVAL | Errno::ENOSYS | Errno::EOPNOTSUPP)
}
