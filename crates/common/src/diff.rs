//! Snapshot diff engine
//!
//! Derives the minimal set of connect/disconnect events explaining the
//! difference between two snapshots. Detection is driven by identity only:
//! a device present in both snapshots never produces an event, even if its
//! name or other attributes were read differently.

use crate::event::{DeviceEvent, EventKind};
use crate::snapshot::Snapshot;

/// Compare `current` against the retained `previous` snapshot
///
/// Without a previous snapshot nothing is emitted: the first capture only
/// establishes the baseline.
///
/// The batch lists every disconnect before any connect, and each group is
/// sorted by identity key, so the output is fully determined by the two
/// inputs.
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<DeviceEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let observed_at = current.captured_at();

    let disconnected = previous
        .entries()
        .filter(|(identity, _)| !current.contains(identity))
        .map(|(_, record)| DeviceEvent::new(EventKind::Disconnected, record.clone(), observed_at));

    let connected = current
        .entries()
        .filter(|(identity, _)| !previous.contains(identity))
        .map(|(_, record)| DeviceEvent::new(EventKind::Connected, record.clone(), observed_at));

    disconnected.chain(connected).collect()
}
