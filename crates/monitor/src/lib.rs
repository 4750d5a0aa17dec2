//! usb-sentry monitor
//!
//! Watches the USB bus by polling: each capture is diffed against the
//! previous one and every connect or disconnect is appended to an event log.

pub mod config;
pub mod event_log;
pub mod poller;
pub mod usb;

pub use config::MonitorConfig;
pub use event_log::{EventLog, LogFormat};
pub use poller::{LoopState, PollLoop, PollStats, TickOutcome, stop_signal};
pub use usb::{DeviceFilter, UsbSnapshotReader};
