//! Common building blocks for usb-sentry
//!
//! This crate holds everything that does not touch the USB bus or the
//! filesystem: the device model and identity rules, snapshots, the diff
//! engine, the error taxonomy, logging setup and test utilities.

pub mod device;
pub mod diff;
pub mod error;
pub mod event;
pub mod logging;
pub mod snapshot;
pub mod test_utils;
pub mod timestamp;

pub use device::{DeviceIdentity, DeviceRecord, UNKNOWN_NAME};
pub use diff::diff;
pub use error::{EnumerationError, Error, LogWriteError, Result};
pub use event::{DeviceEvent, EventKind, EventSink};
pub use logging::setup_logging;
pub use snapshot::{Snapshot, SnapshotReader};
pub use timestamp::format_rfc3339;
