//! Poll loop
//!
//! Drives a [`SnapshotReader`] on a fixed schedule, diffs every capture
//! against the retained baseline and forwards the resulting events to an
//! [`EventSink`].
//!
//! Lifecycle: `Initializing -> Running -> Stopping -> Stopped`.
//!
//! - The first capture only establishes the baseline.
//! - A failed capture keeps the last good baseline and is retried on the
//!   next tick; it never counts as an empty bus.
//! - Ticks fall on `origin + N * interval`. A tick that overruns skips the
//!   boundaries it missed instead of bursting catch-up polls.
//! - The stop signal is watched during the sleep phase, so shutdown does not
//!   wait for the rest of the interval.
//! - Every sink write is attempted [`MAX_WRITE_ATTEMPTS`] times; a write that
//!   still fails stops the loop with an error.

use common::{
    DeviceEvent, EnumerationError, Error, EventKind, EventSink, LogWriteError, Snapshot,
    SnapshotReader, diff,
};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Attempts per sink write: the first try plus one retry
pub const MAX_WRITE_ATTEMPTS: usize = 2;

/// Poll loop lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Initializing => "initializing",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
            LoopState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First successful capture; `devices` were attached at the time
    BaselineEstablished { devices: usize },
    /// Capture diffed against the baseline, `events` forwarded
    Diffed { events: usize },
    /// Capture failed, baseline unchanged
    CaptureFailed,
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub ticks: u64,
    pub connected: u64,
    pub disconnected: u64,
    pub capture_failures: u64,
}

/// Sender half of the stop signal
pub type StopHandle = watch::Sender<bool>;

/// Create a stop signal for [`PollLoop::run`]
///
/// Sending `true` (or dropping the sender) stops the loop.
pub fn stop_signal() -> (StopHandle, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Snapshot poll loop
///
/// Owns the baseline exclusively; nothing outside the loop can observe or
/// change it except through [`PollLoop::baseline`].
pub struct PollLoop<R, S> {
    /// Moved onto the blocking pool for each capture and handed back after
    reader: Option<R>,
    sink: S,
    interval: Duration,
    baseline: Option<Snapshot>,
    state: LoopState,
    stats: PollStats,
}

impl<R, S> PollLoop<R, S>
where
    R: SnapshotReader + 'static,
    S: EventSink,
{
    /// Create a loop polling every `interval`
    pub fn new(reader: R, sink: S, interval: Duration) -> Result<Self, Error> {
        if interval.is_zero() {
            return Err(Error::Config(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            reader: Some(reader),
            sink,
            interval,
            baseline: None,
            state: LoopState::Initializing,
            stats: PollStats::default(),
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The snapshot the next capture will be compared against
    pub fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_ref()
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    /// Take the first capture and enter `Running`
    ///
    /// No events are emitted. If the capture fails the loop still starts;
    /// the first successful tick then establishes the baseline.
    pub async fn initialize(&mut self) -> Result<(), LogWriteError> {
        info!(
            "Starting USB device monitoring (interval {:?})",
            self.interval
        );
        self.report("monitoring started")?;

        match self.tick().await? {
            TickOutcome::BaselineEstablished { devices } => {
                info!("Baseline established with {} device(s)", devices);
            }
            TickOutcome::CaptureFailed => {
                warn!("Initial capture failed, baseline deferred to next tick");
            }
            TickOutcome::Diffed { .. } => {}
        }

        self.transition(LoopState::Running);
        Ok(())
    }

    /// Run one capture/diff/forward cycle
    ///
    /// On success the capture becomes the new baseline. On capture failure
    /// the baseline is left untouched and a diagnostic is reported. Only a
    /// persistent sink failure is returned as an error.
    pub async fn tick(&mut self) -> Result<TickOutcome, LogWriteError> {
        self.stats.ticks += 1;

        let snapshot = match self.capture().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.capture_failures += 1;
                warn!("USB capture failed, keeping previous baseline: {}", e);
                self.report(&format!("capture failed: {}", e))?;
                return Ok(TickOutcome::CaptureFailed);
            }
        };

        let outcome = match self.baseline.as_ref() {
            None => TickOutcome::BaselineEstablished {
                devices: snapshot.len(),
            },
            Some(baseline) => {
                let events = diff(Some(baseline), &snapshot);
                for event in &events {
                    self.forward(event)?;
                }
                TickOutcome::Diffed {
                    events: events.len(),
                }
            }
        };

        debug!("Tick {}: {:?}", self.stats.ticks, outcome);
        self.baseline = Some(snapshot);
        Ok(outcome)
    }

    /// Run until the stop signal fires
    ///
    /// Returns the final counters after reaching `Stopped`, or the sink error
    /// that forced the loop to stop.
    pub async fn run(
        &mut self,
        mut stop: watch::Receiver<bool>,
    ) -> Result<PollStats, LogWriteError> {
        let result = self.run_until_stopped(&mut stop).await;

        self.transition(LoopState::Stopping);
        let stopped = match result {
            Ok(()) => self.report("monitoring stopped"),
            Err(e) => {
                error!("Event log failed, stopping: {}", e);
                Err(e)
            }
        };
        self.transition(LoopState::Stopped);

        info!(
            "USB device monitoring stopped after {} tick(s): {} connected, {} disconnected, {} capture failure(s)",
            self.stats.ticks,
            self.stats.connected,
            self.stats.disconnected,
            self.stats.capture_failures
        );

        stopped.map(|()| self.stats.clone())
    }

    async fn run_until_stopped(
        &mut self,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), LogWriteError> {
        if *stop.borrow_and_update() {
            debug!("Stop requested before start");
            return Ok(());
        }

        self.initialize().await?;

        let origin = Instant::now();
        let mut ticker = time::interval_at(origin + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow_and_update() {
                        debug!("Stop signal received");
                        return Ok(());
                    }
                }

                _ = ticker.tick() => {
                    self.tick().await?;
                }
            }
        }
    }

    async fn capture(&mut self) -> Result<Snapshot, EnumerationError> {
        let mut reader = self.reader.take().ok_or_else(|| {
            EnumerationError::Failed("snapshot reader lost in an earlier capture".to_string())
        })?;

        let (reader, result) = tokio::task::spawn_blocking(move || {
            let result = reader.capture();
            (reader, result)
        })
        .await
        .map_err(|e| EnumerationError::Failed(format!("capture task failed: {}", e)))?;

        self.reader = Some(reader);
        result
    }

    fn forward(&mut self, event: &DeviceEvent) -> Result<(), LogWriteError> {
        let device = event.device();
        info!(
            "USB device {}: {} [{:04x}:{:04x}] at {}",
            event.kind(),
            device.display_name(),
            device.vendor_id(),
            device.product_id(),
            device.identity()
        );

        let sink = &mut self.sink;
        with_retry(|| sink.record(event))?;

        match event.kind() {
            EventKind::Connected => self.stats.connected += 1,
            EventKind::Disconnected => self.stats.disconnected += 1,
        }
        Ok(())
    }

    fn report(&mut self, message: &str) -> Result<(), LogWriteError> {
        let sink = &mut self.sink;
        with_retry(|| sink.diagnostic(message))
    }

    fn transition(&mut self, next: LoopState) {
        debug!("Poll loop {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Run a sink write, retrying up to [`MAX_WRITE_ATTEMPTS`] times in total
fn with_retry<F>(mut write: F) -> Result<(), LogWriteError>
where
    F: FnMut() -> Result<(), LogWriteError>,
{
    let mut attempt = 1;
    loop {
        match write() {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_WRITE_ATTEMPTS => {
                warn!(
                    "Event log write failed (attempt {}/{}), retrying: {}",
                    attempt, MAX_WRITE_ATTEMPTS, e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{RecordingSink, ScriptedReader};

    #[test]
    fn test_zero_interval_rejected() {
        let result = PollLoop::new(
            ScriptedReader::new(Vec::new()),
            RecordingSink::new(),
            Duration::ZERO,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_new_loop_state() {
        let poll = PollLoop::new(
            ScriptedReader::new(Vec::new()),
            RecordingSink::new(),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(poll.state(), LoopState::Initializing);
        assert!(poll.baseline().is_none());
        assert_eq!(poll.stats(), &PollStats::default());
    }

    #[test]
    fn test_with_retry_recovers_from_one_failure() {
        let mut calls = 0;
        let result = with_retry(|| {
            calls += 1;
            if calls == 1 {
                Err(LogWriteError::Closed("transient".into()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_with_retry_is_bounded() {
        let mut calls = 0;
        let result = with_retry(|| {
            calls += 1;
            Err(LogWriteError::Closed("persistent".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, MAX_WRITE_ATTEMPTS);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LoopState::Running.to_string(), "running");
        assert_eq!(LoopState::Stopped.to_string(), "stopped");
    }
}
