//! Device snapshots
//!
//! A [`Snapshot`] is the full set of devices seen at one poll tick, keyed by
//! [`DeviceIdentity`]. Snapshots are produced by a [`SnapshotReader`] and are
//! never modified once built.

use crate::device::{DeviceIdentity, DeviceRecord};
use crate::error::EnumerationError;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::SystemTime;
use tracing::debug;

/// Devices observed at a single point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    captured_at: SystemTime,
    devices: BTreeMap<DeviceIdentity, DeviceRecord>,
}

impl Snapshot {
    /// Snapshot of an empty bus
    pub fn empty(captured_at: SystemTime) -> Self {
        Self {
            captured_at,
            devices: BTreeMap::new(),
        }
    }

    /// Build a snapshot from captured records
    ///
    /// Keys are unique within a snapshot: when two records resolve to the
    /// same identity the first one is kept.
    pub fn from_records(
        captured_at: SystemTime,
        records: impl IntoIterator<Item = DeviceRecord>,
    ) -> Self {
        let mut devices = BTreeMap::new();

        for record in records {
            match devices.entry(record.identity()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(existing) => {
                    debug!(
                        "Duplicate device identity {} in snapshot, keeping first ({} / {})",
                        existing.key(),
                        existing.get().display_name(),
                        record.display_name()
                    );
                }
            }
        }

        Self {
            captured_at,
            devices,
        }
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, identity: &DeviceIdentity) -> bool {
        self.devices.contains_key(identity)
    }

    pub fn get(&self, identity: &DeviceIdentity) -> Option<&DeviceRecord> {
        self.devices.get(identity)
    }

    /// Identity/record pairs in identity order
    pub fn entries(&self) -> impl Iterator<Item = (&DeviceIdentity, &DeviceRecord)> {
        self.devices.iter()
    }

    /// Records in identity order
    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }
}

/// Source of device snapshots
///
/// Implementations wrap a blocking OS enumeration call. An empty bus is an
/// empty snapshot, not an error.
pub trait SnapshotReader: Send {
    fn capture(&mut self) -> Result<Snapshot, EnumerationError>;
}

impl<R: SnapshotReader + ?Sized> SnapshotReader for Box<R> {
    fn capture(&mut self) -> Result<Snapshot, EnumerationError> {
        (**self).capture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Snapshot::empty(SystemTime::UNIX_EPOCH);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
        assert_eq!(snapshot.captured_at(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_duplicate_identity_keeps_first() {
        let first = DeviceRecord::new(0x1234, 0x5678).with_product("First");
        let second = DeviceRecord::new(0x1234, 0x5678).with_product("Second");

        let snapshot = Snapshot::from_records(SystemTime::now(), vec![first.clone(), second]);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&first.identity()), Some(&first));
    }

    #[test]
    fn test_same_ids_on_different_ports_are_distinct() {
        let a = DeviceRecord::new(0x1234, 0x5678).with_port_path(1, vec![1]);
        let b = DeviceRecord::new(0x1234, 0x5678).with_port_path(1, vec![2]);

        let snapshot = Snapshot::from_records(SystemTime::now(), vec![a, b]);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_devices_iterate_in_identity_order() {
        let records = vec![
            DeviceRecord::new(3, 3).with_port_path(2, vec![1]),
            DeviceRecord::new(1, 1).with_port_path(1, vec![4]),
            DeviceRecord::new(2, 2).with_port_path(1, vec![2]),
        ];

        let snapshot = Snapshot::from_records(SystemTime::now(), records);
        let order: Vec<u16> = snapshot.devices().map(|d| d.vendor_id()).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }
}
