//! Connection events and the sink that receives them

use crate::device::DeviceRecord;
use crate::error::LogWriteError;
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

/// What happened to a device between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Disconnected,
    Connected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "CONNECTED",
            EventKind::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single connect or disconnect, produced by [`crate::diff::diff`]
///
/// For disconnects the record is the last one seen while the device was
/// still attached. The timestamp is the capture time of the snapshot in
/// which the change was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    kind: EventKind,
    device: DeviceRecord,
    timestamp: SystemTime,
}

impl DeviceEvent {
    pub(crate) fn new(kind: EventKind, device: DeviceRecord, timestamp: SystemTime) -> Self {
        Self {
            kind,
            device,
            timestamp,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn device(&self) -> &DeviceRecord {
        &self.device
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// Destination for device events and loop diagnostics
///
/// A sink may drop diagnostics (for example when debug output is off) but
/// must persist every event or return an error.
pub trait EventSink: Send {
    fn record(&mut self, event: &DeviceEvent) -> Result<(), LogWriteError>;

    fn diagnostic(&mut self, message: &str) -> Result<(), LogWriteError>;
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn record(&mut self, event: &DeviceEvent) -> Result<(), LogWriteError> {
        (**self).record(event)
    }

    fn diagnostic(&mut self, message: &str) -> Result<(), LogWriteError> {
        (**self).diagnostic(message)
    }
}
