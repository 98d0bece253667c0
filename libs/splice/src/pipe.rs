//! Pipe buffer used as the intermediate hop of a zero-copy transfer.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::pipe2;
use tracing::debug;

use crate::error::SpliceError;

/// Linux default pipe capacity (16 pages).
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// An anonymous, unidirectional kernel buffer.
///
/// Both ends are owned descriptors and are closed exactly once when the
/// pipe is dropped, whichever way its owner exits.
#[derive(Debug)]
pub struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
    capacity: usize,
}

impl Pipe {
    /// Create a nonblocking pipe able to hold at least `min_capacity` bytes
    /// when the kernel allows it.
    pub fn new(min_capacity: usize) -> Result<Self, SpliceError> {
        Self::open(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC, min_capacity)
    }

    /// Create a pipe whose ends block. Used for file copies where neither
    /// side ever reports `EAGAIN`.
    pub fn blocking(min_capacity: usize) -> Result<Self, SpliceError> {
        Self::open(OFlag::O_CLOEXEC, min_capacity)
    }

    fn open(flags: OFlag, min_capacity: usize) -> Result<Self, SpliceError> {
        let (read, write) = pipe2(flags).map_err(SpliceError::Pipe)?;

        let mut capacity = query_capacity(&write).unwrap_or(DEFAULT_PIPE_CAPACITY);
        if min_capacity > capacity {
            match grow(&write, min_capacity) {
                Ok(grown) => capacity = grown,
                Err(errno) => {
                    // Usually EPERM above /proc/sys/fs/pipe-max-size.
                    debug!(
                        requested = min_capacity,
                        capacity,
                        error = %errno,
                        "pipe capacity not raised"
                    );
                }
            }
        }

        Ok(Self {
            read,
            write,
            capacity,
        })
    }

    /// The end bytes are spliced out of.
    pub fn read_end(&self) -> BorrowedFd<'_> {
        self.read.as_fd()
    }

    /// The end bytes are spliced into.
    pub fn write_end(&self) -> BorrowedFd<'_> {
        self.write.as_fd()
    }

    /// Kernel buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn query_capacity(fd: &OwnedFd) -> Option<usize> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_GETPIPE_SZ)
        .ok()
        .and_then(|size| usize::try_from(size).ok())
}

fn grow(fd: &OwnedFd, size: usize) -> nix::Result<usize> {
    let requested = i32::try_from(size).unwrap_or(i32::MAX);
    let granted = fcntl(fd.as_raw_fd(), FcntlArg::F_SETPIPE_SZ(requested))?;
    Ok(usize::try_from(granted).unwrap_or(size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_is_nonblocking() {
        let pipe = Pipe::new(1).unwrap();

        for fd in [pipe.read_end(), pipe.write_end()] {
            let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).unwrap();
            assert!(OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK));
        }
    }

    #[test]
    fn test_blocking_pipe_has_no_nonblock_flag() {
        let pipe = Pipe::blocking(1).unwrap();
        let flags = fcntl(pipe.read_end().as_raw_fd(), FcntlArg::F_GETFL).unwrap();
        assert!(!OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK));
    }

    #[test]
    fn test_small_request_keeps_default_capacity() {
        let pipe = Pipe::new(1).unwrap();
        assert!(pipe.capacity() >= 4096);
    }

    #[test]
    fn test_large_request_grows_pipe() {
        let pipe = Pipe::new(256 * 1024).unwrap();
        assert!(pipe.capacity() >= 256 * 1024);
    }

    #[test]
    fn test_empty_pipe_read_would_block() {
        let pipe = Pipe::new(1).unwrap();
        let mut buf = [0u8; 8];
        let err = nix::unistd::read(pipe.read_end().as_raw_fd(), &mut buf).unwrap_err();
        assert_eq!(err, nix::errno::Errno::EAGAIN);
    }
}
