//! Append-only event log
//!
//! Writes one line per device event (and per diagnostic, when enabled) to a
//! file opened in append mode. Two formats are supported:
//!
//! ```text
//! 2024-05-01T10:00:00.000Z CONNECTED name="Flash Drive" vid=0x0781 pid=0x5567 serial="4C53" id=1-2
//! 2024-05-01T10:00:05.000Z DISCONNECTED name="unknown" vid=0x1234 pid=0x5678 id=1-3
//! 2024-05-01T10:00:05.000Z DIAGNOSTIC message="USB access denied: Access denied"
//! ```
//!
//! and, with [`LogFormat::Json`], one JSON object per line carrying the same
//! fields. Name, vendor ID and product ID are always present.

use common::{DeviceEvent, EventKind, EventSink, LogWriteError, format_rfc3339};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

const DIAGNOSTIC_KIND: &str = "DIAGNOSTIC";

/// Line format of the event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct EventLine<'a> {
    timestamp: String,
    kind: EventKind,
    name: &'a str,
    vendor_id: String,
    product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial_number: Option<&'a str>,
    id: String,
}

#[derive(Serialize)]
struct DiagnosticLine<'a> {
    timestamp: String,
    kind: &'static str,
    message: &'a str,
}

/// File-backed [`EventSink`]
///
/// The file is created if missing and only ever appended to. After a failed
/// write the handle is dropped and reopened on the next write, so a retry
/// also recovers from the file being moved or deleted underneath us.
pub struct EventLog {
    path: PathBuf,
    file: Option<File>,
    format: LogFormat,
    diagnostics: bool,
}

impl EventLog {
    /// Open (or create) the log at `path`
    ///
    /// Fails immediately if the file cannot be opened, so an unwritable path
    /// is caught at startup.
    pub fn open(
        path: impl Into<PathBuf>,
        format: LogFormat,
        diagnostics: bool,
    ) -> Result<Self, LogWriteError> {
        let path = path.into();
        let file = open_append(&path)?;
        debug!("Opened event log: {}", path.display());

        Ok(Self {
            path,
            file: Some(file),
            format,
            diagnostics,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render an event as a single log line (without trailing newline)
    pub fn format_event(&self, event: &DeviceEvent) -> Result<String, LogWriteError> {
        let device = event.device();
        let timestamp = format_rfc3339(event.timestamp());

        match self.format {
            LogFormat::Text => {
                let mut line = format!(
                    "{} {} name={:?} vid=0x{:04x} pid=0x{:04x}",
                    timestamp,
                    event.kind(),
                    device.display_name(),
                    device.vendor_id(),
                    device.product_id()
                );
                if let Some(serial) = device.serial_number() {
                    line.push_str(&format!(" serial={:?}", serial));
                }
                line.push_str(&format!(" id={}", device.identity()));
                Ok(line)
            }
            LogFormat::Json => encode(&EventLine {
                timestamp,
                kind: event.kind(),
                name: device.display_name(),
                vendor_id: format!("0x{:04x}", device.vendor_id()),
                product_id: format!("0x{:04x}", device.product_id()),
                serial_number: device.serial_number(),
                id: device.identity().to_string(),
            }),
        }
    }

    /// Render a diagnostic as a single log line (without trailing newline)
    pub fn format_diagnostic(
        &self,
        at: SystemTime,
        message: &str,
    ) -> Result<String, LogWriteError> {
        let timestamp = format_rfc3339(at);

        match self.format {
            LogFormat::Text => Ok(format!(
                "{} {} message={:?}",
                timestamp, DIAGNOSTIC_KIND, message
            )),
            LogFormat::Json => encode(&DiagnosticLine {
                timestamp,
                kind: DIAGNOSTIC_KIND,
                message,
            }),
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), LogWriteError> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => {
                debug!("Reopening event log: {}", self.path.display());
                open_append(&self.path)?
            }
        };

        let result = file
            .write_all(line.as_bytes())
            .and_then(|()| file.write_all(b"\n"))
            .and_then(|()| file.flush());

        match result {
            Ok(()) => {
                self.file = Some(file);
                Ok(())
            }
            Err(source) => Err(LogWriteError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl EventSink for EventLog {
    fn record(&mut self, event: &DeviceEvent) -> Result<(), LogWriteError> {
        let line = self.format_event(event)?;
        self.write_line(&line)
    }

    fn diagnostic(&mut self, message: &str) -> Result<(), LogWriteError> {
        if !self.diagnostics {
            return Ok(());
        }
        let line = self.format_diagnostic(SystemTime::now(), message)?;
        self.write_line(&line)
    }
}

fn open_append(path: &Path) -> Result<File, LogWriteError> {
    let io_error = |source| LogWriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)
}

fn encode<T: Serialize>(line: &T) -> Result<String, LogWriteError> {
    serde_json::to_string(line).map_err(|e| LogWriteError::Encode(e.to_string()))
}
