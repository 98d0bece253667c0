//! Buffered direction: read into a user-space buffer, then write it out.
//!
//! Used when zero-copy is disabled, unsupported by the platform, or
//! rejected by the kernel for a particular pair of descriptors.

use std::io;

use sproxy_splice::{ErrorClass, Stage};
use tokio::net::TcpStream;

use super::copier::{Tally, Termination};
use super::endpoint::Endpoint;

pub(crate) async fn run(
    source: &Endpoint,
    dest: &Endpoint,
    buffer_size: usize,
    tally: &mut Tally,
) -> Termination {
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        let n = match read(source.stream(), &mut buf, tally).await {
            Ok(0) => return Termination::Eof,
            Ok(n) => n,
            Err(err) => return Termination::from_io(Stage::Drain, err),
        };
        tally.record_read(n);

        let mut offset = 0;
        while offset < n {
            match write(dest.stream(), &buf[offset..n], tally).await {
                Ok(0) => {
                    return Termination::from_io(
                        Stage::Fill,
                        io::Error::from(io::ErrorKind::WriteZero),
                    );
                }
                Ok(written) => {
                    offset += written;
                    tally.record_written(written);
                }
                Err(err) => return Termination::from_io(Stage::Fill, err),
            }
        }
    }
}

async fn read(stream: &TcpStream, buf: &mut [u8], tally: &mut Tally) -> io::Result<usize> {
    loop {
        stream.readable().await?;
        match stream.try_read(buf) {
            Err(err) if ErrorClass::of_io(&err).is_transient() => tally.retried(),
            result => return result,
        }
    }
}

async fn write(stream: &TcpStream, buf: &[u8], tally: &mut Tally) -> io::Result<usize> {
    loop {
        stream.writable().await?;
        match stream.try_write(buf) {
            Err(err) if ErrorClass::of_io(&err).is_transient() => tally.retried(),
            result => return result,
        }
    }
}
