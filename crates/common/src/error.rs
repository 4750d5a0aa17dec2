//! Common error types

use std::path::PathBuf;
use thiserror::Error;

/// Failure to take a device snapshot
///
/// Always surfaced to the caller. A failed capture must never be read as an
/// empty bus.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("USB access denied: {0}")]
    AccessDenied(String),

    #[error("USB enumeration unavailable: {0}")]
    Unavailable(String),

    #[error("USB enumeration failed: {0}")]
    Failed(String),
}

/// Failure to persist an entry to the event log
#[derive(Debug, Error)]
pub enum LogWriteError {
    #[error("Failed to write event log {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode log entry: {0}")]
    Encode(String),

    #[error("Event sink closed: {0}")]
    Closed(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
