//! USB subsystem
//!
//! Device enumeration through libusb and VID:PID filtering. Everything here
//! is blocking; the poll loop runs captures on tokio's blocking pool.

pub mod filter;
pub mod reader;

pub use filter::{DeviceFilter, FilterError};
pub use reader::{UsbSnapshotReader, map_rusb_error};
