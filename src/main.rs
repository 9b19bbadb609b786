//! # RC Bridge
//!
//! SBUS control link between a ground unit and an air unit.
//!
//! The same binary runs either end; `[service].role` in the configuration
//! file selects which.
//!
//! # Usage
//!
//! ```bash
//! rc-bridge config/air.toml
//! ```
//!
//! Runs until Ctrl+C, then stops the transmit loop before the input tasks.

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use rc_bridge::config::{Config, LoggingConfig};
use rc_bridge::service::Service;

/// Configuration used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/air.toml";

/// Prefix of the daily rolling log files
const LOG_FILE_PREFIX: &str = "rc-bridge.log";

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. The returned guard must be
/// kept alive for file logging to flush.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("invalid log level '{}'", config.level))?,
    };

    let (file_layer, guard) = if config.log_dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = Config::load(&path).with_context(|| format!("failed to load {}", path))?;
    let _guard = init_logging(&config.logging)?;

    info!("RC Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {}", path);

    let service = Service::start(&config)
        .await
        .context("failed to start service")?;
    info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    service.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        assert!(DEFAULT_CONFIG_PATH.ends_with(".toml"));
    }

    #[test]
    fn test_log_file_prefix() {
        assert_eq!(LOG_FILE_PREFIX, "rc-bridge.log");
    }
}
