//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Setup tracing subscriber for the application
///
/// `RUST_LOG` takes precedence over `default_level`. Output goes to stderr so
/// it never mixes with the event log or `--list-devices` output.
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))?;

    Ok(())
}

/// Default filter level for the `-d` flag
pub fn default_level(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}
