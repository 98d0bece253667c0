//! Zero-copy direction: socket -> pipe -> socket with `splice(2)`.
//!
//! Each iteration has two nonblocking stages. Drain moves up to
//! `buffer_size` bytes from the source socket into the pipe. Fill moves
//! those bytes from the pipe into the destination socket, looping until
//! the pipe is empty again, so a drain never starts against a full pipe.
//!
//! A would-block result clears the runtime's cached readiness for the
//! socket involved and waits for the next readiness edge: readable for
//! drain, writable for fill. `EINTR` retries at once.

use std::io;
use std::ops::Deref;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use sproxy_splice::{
    is_unsupported, splice_nonblocking, Errno, ErrorClass, Pipe, SpliceError, Stage,
};
use tokio::io::Interest;

use super::copier::{Tally, Termination};
use super::endpoint::Endpoint;
use super::stats::ProxyStats;
use crate::error::ProxyError;

pub(crate) enum Outcome {
    Finished(Termination),
    /// Splice cannot be used on these descriptors; nothing has moved yet
    /// and nothing has been shut down.
    Unsupported(Errno),
}

/// Pipe registered in the proxy statistics for as long as it is open.
struct TrackedPipe {
    pipe: Pipe,
    stats: Arc<ProxyStats>,
}

impl TrackedPipe {
    fn open(min_capacity: usize, stats: &Arc<ProxyStats>) -> Result<Self, SpliceError> {
        let pipe = Pipe::new(min_capacity)?;
        stats.pipes_created.fetch_add(1, Ordering::Relaxed);
        stats.pipes_open.fetch_add(1, Ordering::Relaxed);
        Ok(Self {
            pipe,
            stats: Arc::clone(stats),
        })
    }
}

impl Deref for TrackedPipe {
    type Target = Pipe;

    fn deref(&self) -> &Pipe {
        &self.pipe
    }
}

impl Drop for TrackedPipe {
    fn drop(&mut self) {
        self.stats.pipes_open.fetch_sub(1, Ordering::Relaxed);
    }
}

pub(crate) async fn run(
    source: &Endpoint,
    dest: &Endpoint,
    buffer_size: usize,
    stats: &Arc<ProxyStats>,
    tally: &mut Tally,
) -> Outcome {
    let pipe = match TrackedPipe::open(buffer_size, stats) {
        Ok(pipe) => pipe,
        Err(err) => {
            return match err.errno() {
                Some(errno) if is_unsupported(errno) => Outcome::Unsupported(errno),
                _ => Outcome::Finished(Termination::Error {
                    detail: ProxyError::from(err).to_string(),
                }),
            };
        }
    };

    // Never stage more than the pipe holds.
    let len = buffer_size.min(pipe.capacity()).max(1);

    loop {
        let staged = match drain(source, &pipe, len, tally).await {
            Ok(0) => return Outcome::Finished(Termination::Eof),
            Ok(n) => n,
            Err(err) => {
                if tally.read == 0 {
                    if let Some(errno) = err.raw_os_error().map(Errno::from_raw) {
                        if is_unsupported(errno) {
                            return Outcome::Unsupported(errno);
                        }
                    }
                }
                return Outcome::Finished(Termination::from_io(Stage::Drain, err));
            }
        };
        tally.record_read(staged);

        let mut pending = staged;
        while pending > 0 {
            match fill(&pipe, dest, pending, tally).await {
                Ok(0) => {
                    return Outcome::Finished(Termination::Error {
                        detail: ProxyError::from(SpliceError::ShortPipe { pending }).to_string(),
                    });
                }
                Ok(n) => {
                    pending -= n;
                    tally.record_written(n);
                }
                Err(err) => return Outcome::Finished(Termination::from_io(Stage::Fill, err)),
            }
        }
    }
}

/// Source socket into the pipe's write end.
async fn drain(
    source: &Endpoint,
    pipe: &Pipe,
    len: usize,
    tally: &mut Tally,
) -> io::Result<usize> {
    let stream = source.stream();
    loop {
        stream.readable().await?;
        let result = stream.try_io(Interest::READABLE, || {
            splice_nonblocking(stream, pipe.write_end(), len).map_err(io::Error::from)
        });
        match result {
            Err(err) if ErrorClass::of_io(&err).is_transient() => tally.retried(),
            result => return result,
        }
    }
}

/// Pipe's read end into the destination socket.
async fn fill(
    pipe: &Pipe,
    dest: &Endpoint,
    len: usize,
    tally: &mut Tally,
) -> io::Result<usize> {
    let stream = dest.stream();
    loop {
        stream.writable().await?;
        let result = stream.try_io(Interest::WRITABLE, || {
            splice_nonblocking(pipe.read_end(), stream, len).map_err(io::Error::from)
        });
        match result {
            Err(err) if ErrorClass::of_io(&err).is_transient() => tally.retried(),
            result => return result,
        }
    }
}
