//! Thin wrappers over `splice(2)`.

use std::os::fd::AsFd;

use nix::fcntl::{splice, SpliceFFlags};

/// Move up to `len` bytes from `from` to `to` without blocking.
///
/// One side must be a pipe. Returns the number of bytes moved; `Ok(0)`
/// means the source reached end-of-stream. `EAGAIN` is returned as an
/// error and is expected whenever the socket side is not ready.
///
/// `SPLICE_F_MORE` is never set, so small writes are not held back
/// waiting for more data.
pub fn splice_nonblocking<F: AsFd, T: AsFd>(from: F, to: T, len: usize) -> nix::Result<usize> {
    splice(
        from,
        None,
        to,
        None,
        len,
        SpliceFFlags::SPLICE_F_NONBLOCK | SpliceFFlags::SPLICE_F_MOVE,
    )
}

/// Move up to `len` bytes from `from` to `to`, honoring the descriptors'
/// own blocking mode.
pub fn splice_blocking<F: AsFd, T: AsFd>(from: F, to: T, len: usize) -> nix::Result<usize> {
    splice(from, None, to, None, len, SpliceFFlags::SPLICE_F_MOVE)
}
