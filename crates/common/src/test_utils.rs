//! Test utilities for usb-sentry
//!
//! Provides mock devices, a scripted snapshot reader and in-memory event
//! sinks for driving the poll loop without hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_device;
//!
//! let device = create_mock_device(1, 0x1234, 0x5678);
//! assert_eq!(device.vendor_id(), 0x1234);
//! ```

use crate::device::DeviceRecord;
use crate::error::{EnumerationError, LogWriteError};
use crate::event::{DeviceEvent, EventSink};
use crate::snapshot::{Snapshot, SnapshotReader};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock device plugged into port `port` of bus 1
///
/// # Example
/// ```
/// use common::test_utils::create_mock_device;
///
/// let device = create_mock_device(3, 0xabcd, 0x0001);
/// assert_eq!(device.port_numbers(), Some(&[3u8][..]));
/// ```
pub fn create_mock_device(port: u8, vendor_id: u16, product_id: u16) -> DeviceRecord {
    DeviceRecord::new(vendor_id, product_id)
        .with_product(format!("Test Device {}", port))
        .with_manufacturer("Test Manufacturer")
        .with_serial_number(format!("SN{:06}", port))
        .with_port_path(1, vec![port])
        .with_address(1, port)
}

/// Create `count` distinct mock devices on ports 1..=count
pub fn create_mock_device_list(count: u8) -> Vec<DeviceRecord> {
    (1..=count)
        .map(|port| create_mock_device(port, 0x1000 + u16::from(port), 0x2000 + u16::from(port)))
        .collect()
}

/// Build a snapshot captured now
pub fn snapshot_of(records: &[DeviceRecord]) -> Snapshot {
    Snapshot::from_records(SystemTime::now(), records.to_vec())
}

/// One scripted result for [`ScriptedReader`]
pub type ScriptStep = Result<Vec<DeviceRecord>, EnumerationError>;

/// Start times of every capture made by a [`ScriptedReader`]
#[derive(Clone, Default)]
pub struct CaptureLog {
    starts: Arc<Mutex<Vec<Instant>>>,
}

impl CaptureLog {
    pub fn starts(&self) -> Vec<Instant> {
        self.starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, at: Instant) {
        self.starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(at);
    }
}

/// Snapshot reader replaying a fixed script
///
/// Each capture pops the next step. Once the script is exhausted the last
/// successful device list is repeated, so an idle loop sees a stable bus.
pub struct ScriptedReader {
    steps: VecDeque<ScriptStep>,
    last_good: Vec<DeviceRecord>,
    delay: Duration,
    captures: CaptureLog,
}

impl ScriptedReader {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            last_good: Vec::new(),
            delay: Duration::ZERO,
            captures: CaptureLog::default(),
        }
    }

    /// Block for `delay` on every capture, like a slow bus
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared log of capture start times
    pub fn capture_log(&self) -> CaptureLog {
        self.captures.clone()
    }
}

impl SnapshotReader for ScriptedReader {
    fn capture(&mut self) -> Result<Snapshot, EnumerationError> {
        self.captures.push(Instant::now());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        match self.steps.pop_front() {
            Some(Ok(records)) => {
                self.last_good = records.clone();
                Ok(Snapshot::from_records(SystemTime::now(), records))
            }
            Some(Err(e)) => Err(e),
            None => Ok(Snapshot::from_records(
                SystemTime::now(),
                self.last_good.clone(),
            )),
        }
    }
}

/// Entry captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEntry {
    Event(DeviceEvent),
    Diagnostic(String),
}

/// In-memory sink whose contents stay observable after it is moved
#[derive(Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<SinkEntry>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                SinkEntry::Event(event) => Some(event),
                SinkEntry::Diagnostic(_) => None,
            })
            .collect()
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                SinkEntry::Diagnostic(message) => Some(message),
                SinkEntry::Event(_) => None,
            })
            .collect()
    }

    fn push(&self, entry: SinkEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl EventSink for RecordingSink {
    fn record(&mut self, event: &DeviceEvent) -> Result<(), LogWriteError> {
        self.push(SinkEntry::Event(event.clone()));
        Ok(())
    }

    fn diagnostic(&mut self, message: &str) -> Result<(), LogWriteError> {
        self.push(SinkEntry::Diagnostic(message.to_string()));
        Ok(())
    }
}

/// Sink that fails the next `failures` writes, then records normally
#[derive(Clone, Default)]
pub struct FlakySink {
    inner: RecordingSink,
    failures: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl FlakySink {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: RecordingSink::new(),
            failures: Arc::new(AtomicUsize::new(failures)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `failures` writes fail
    pub fn fail_next(&self, failures: usize) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    /// Total write attempts, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> &RecordingSink {
        &self.inner
    }

    fn check(&self) -> Result<(), LogWriteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if failed {
            Err(LogWriteError::Io {
                path: "flaky.log".into(),
                source: std::io::Error::other("simulated write failure"),
            })
        } else {
            Ok(())
        }
    }
}

impl EventSink for FlakySink {
    fn record(&mut self, event: &DeviceEvent) -> Result<(), LogWriteError> {
        self.check()?;
        self.inner.record(event)
    }

    fn diagnostic(&mut self, message: &str) -> Result<(), LogWriteError> {
        self.check()?;
        self.inner.diagnostic(message)
    }
}
