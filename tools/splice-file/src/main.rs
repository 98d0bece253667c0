//! splice-file - copy a regular file through a pipe with `splice(2)`.
//!
//! The output file is created or truncated. A zero-byte input produces a
//! zero-byte output.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Copy --in-file to --out-file without moving the bytes through user space.
#[derive(Debug, Parser)]
#[command(name = "splice-file")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source file.
    #[arg(long, value_name = "PATH")]
    in_file: PathBuf,

    /// Destination file, created or truncated.
    #[arg(long, value_name = "PATH")]
    out_file: PathBuf,

    /// Bytes moved per splice call.
    #[arg(long, default_value_t = 64 * 1024)]
    block_size: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "splice-file failed");
            let mut source = e.source();
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = cause.source();
            }
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<u64> {
    let src = File::open(&cli.in_file)
        .with_context(|| format!("failed to open {}", cli.in_file.display()))?;
    let dst = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&cli.out_file)
        .with_context(|| format!("failed to create {}", cli.out_file.display()))?;

    info!(
        in_file = %cli.in_file.display(),
        out_file = %cli.out_file.display(),
        block_size = cli.block_size,
        "Copy started"
    );

    let started = Instant::now();
    let total = copy(&src, &dst, cli.block_size, &cli.in_file)?;
    info!(
        bytes = total,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Copy complete"
    );
    Ok(total)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn copy(src: &File, dst: &File, block_size: usize, path: &Path) -> Result<u64> {
    sproxy_splice::copy_file(src, dst, block_size)
        .with_context(|| format!("failed to splice {}", path.display()))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn copy(_src: &File, _dst: &File, _block_size: usize, _path: &Path) -> Result<u64> {
    anyhow::bail!("splice(2) is not available on this platform")
}
