//! Blocking file-to-file copy through a pipe.

use std::fs::File;

use nix::errno::Errno;
use tracing::debug;

use crate::error::{ErrorClass, SpliceError, Stage};
use crate::ops::splice_blocking;
use crate::pipe::Pipe;

/// Copy `src` into `dst` from their current offsets, `block_size` bytes per
/// splice call. Returns the number of bytes copied.
pub fn copy_file(src: &File, dst: &File, block_size: usize) -> Result<u64, SpliceError> {
    let block = block_size.max(1);
    let pipe = Pipe::blocking(block)?;
    let mut total = 0u64;

    loop {
        let staged = retry(|| splice_blocking(src, pipe.write_end(), block)).map_err(|source| {
            SpliceError::Splice {
                stage: Stage::Drain,
                source,
            }
        })?;
        if staged == 0 {
            break;
        }

        let mut pending = staged;
        while pending > 0 {
            let moved = retry(|| splice_blocking(pipe.read_end(), dst, pending)).map_err(
                |source| SpliceError::Splice {
                    stage: Stage::Fill,
                    source,
                },
            )?;
            if moved == 0 {
                return Err(SpliceError::ShortPipe { pending });
            }
            pending -= moved;
        }

        total += staged as u64;
        debug!(staged, total, "Block copied");
    }

    Ok(total)
}

fn retry<F: FnMut() -> nix::Result<usize>>(mut op: F) -> nix::Result<usize> {
    loop {
        match op() {
            Err(Errno::EAGAIN) => std::thread::yield_now(),
            Err(errno) if ErrorClass::of_errno(errno).is_transient() => {}
            result => return result,
        }
    }
}
