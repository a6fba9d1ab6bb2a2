//! Service bootstrap
//!
//! Command line arguments, logging setup and shutdown signal handling.

use clap::Parser;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_MQTT_CONFIG, DEFAULT_SERVICE_CONFIG};

/// Command-line arguments for hp3001srv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hp3001srv",
    version = env!("CARGO_PKG_VERSION"),
    about = "HP3001 USB temperature/humidity sensor to MQTT bridge",
    long_about = None
)]
pub struct Args {
    /// Service configuration file (period, topic root)
    #[arg(short = 'c', long, default_value = DEFAULT_SERVICE_CONFIG)]
    pub config: PathBuf,

    /// MQTT configuration file (broker, credentials, TLS)
    #[arg(short = 'm', long, default_value = DEFAULT_MQTT_CONFIG)]
    pub mqtt_config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,

    /// Run a single poll/publish cycle and exit
    #[arg(long)]
    pub once: bool,
}

/// Filter directive for the crate at `level`, e.g. `hp3001srv=debug`
pub fn default_filter(level: &str) -> String {
    format!("{}={}", env!("CARGO_CRATE_NAME"), level.to_lowercase())
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` takes precedence over the `--log-level` flag.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Wait for Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Service will only respond to Ctrl+C",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
