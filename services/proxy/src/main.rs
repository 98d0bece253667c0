//! splice-proxy
//!
//! Forwards every inbound TCP connection to one fixed backend.
//! Runs until Ctrl-C or SIGTERM.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use sproxy::config::{Cli, Config};
use sproxy::{logging, Listener, ProxyStats};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = logging::init(&config.log_level, config.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    match run(config).await {
        Ok(()) => {
            info!("splice-proxy stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "splice-proxy failed");
            let mut source = e.source();
            while let Some(cause) = source {
                error!(cause = %cause, "caused by");
                source = cause.source();
            }
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_addr = %config.bind_addr,
        backend = %config.backend,
        mode = %config.relay.mode,
        buffer_size = config.relay.buffer_size,
        connect_timeout_ms = config.connect_timeout.as_millis() as u64,
        "Starting splice-proxy"
    );
    if config.splice_degraded() {
        warn!("Zero-copy splice unsupported on this platform, using buffered copy");
    }

    let stats = Arc::new(ProxyStats::default());
    let listener = Listener::bind(config.listener_config(), Arc::clone(&stats))
        .await
        .inspect_err(|e| error!(reason = e.reason_code(), error = %e, "Bind failed"))
        .context("failed to start listener")?;
    let listener = Arc::new(listener);

    tokio::select! {
        result = listener.run() => {
            result.context("listener stopped")?;
        }
        signal = shutdown_signal() => {
            signal?;
            info!("Received shutdown signal");
        }
    }

    let snapshot = stats.snapshot();
    info!(
        connections_accepted = snapshot.connections_accepted,
        backend_failed = snapshot.backend_failed,
        pairs_active = snapshot.pairs_active,
        pairs_closed = snapshot.pairs_closed,
        bytes_to_backend = snapshot.bytes_to_backend,
        bytes_from_backend = snapshot.bytes_from_backend,
        "Final statistics"
    );

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")
}
