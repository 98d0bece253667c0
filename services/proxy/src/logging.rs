//! Logging initialization.

use clap::ValueEnum;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line, for an external log sink.
    Json,
    /// Human-readable single-line output.
    Compact,
}

/// Build the filter: `RUST_LOG` wins, otherwise `level`.
fn filter(level: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(level)?),
    }
}

/// Install the global subscriber. Call once, from the binary.
pub fn init(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = filter(level)?;

    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_levels() {
        for level in ["trace", "debug", "info", "warn", "error", "sproxy=debug,info"] {
            assert!(EnvFilter::try_new(level).is_ok(), "{level}");
        }
    }

    #[test]
    fn test_log_format_values() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(
            LogFormat::from_str("compact", true).unwrap(),
            LogFormat::Compact
        );
        assert!(LogFormat::from_str("pretty", true).is_err());
    }
}
