//! Diff Engine Property Tests
//!
//! Property-based checks for the snapshot diff engine:
//! - Self-diff produces no events
//! - First capture never floods connect events
//! - Disjoint snapshots produce one event per device, disconnects first
//! - Identity, not attributes, drives detection
//!
//! Run with: `cargo test -p common --test diff_properties`

use common::{DeviceRecord, EventKind, Snapshot, diff};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

// ============================================================================
// Strategies
// ============================================================================

/// Devices on bus 1 with unique port numbers drawn from `ports`
fn devices_on_ports(ports: BTreeSet<u8>) -> impl Strategy<Value = Vec<DeviceRecord>> {
    let count = ports.len();
    (
        proptest::collection::vec((any::<u16>(), any::<u16>(), "[A-Za-z ]{0,12}"), count),
        Just(ports),
    )
        .prop_map(|(attrs, ports)| {
            ports
                .into_iter()
                .zip(attrs)
                .map(|(port, (vid, pid, name))| {
                    DeviceRecord::new(vid, pid)
                        .with_product(name)
                        .with_port_path(1, vec![port])
                })
                .collect()
        })
}

fn port_set() -> impl Strategy<Value = BTreeSet<u8>> {
    proptest::collection::btree_set(1u8..=127, 0..16)
}

/// Two non-empty device lists occupying disjoint ports
fn disjoint_device_lists() -> impl Strategy<Value = (Vec<DeviceRecord>, Vec<DeviceRecord>)> {
    proptest::collection::btree_set(1u8..=127, 2..24).prop_flat_map(|ports| {
        let ports: Vec<u8> = ports.into_iter().collect();
        let split = ports.len() / 2;
        let left: BTreeSet<u8> = ports[..split].iter().copied().collect();
        let right: BTreeSet<u8> = ports[split..].iter().copied().collect();
        (devices_on_ports(left), devices_on_ports(right))
    })
}

fn snapshot(secs: u64, records: Vec<DeviceRecord>) -> Snapshot {
    Snapshot::from_records(SystemTime::UNIX_EPOCH + Duration::from_secs(secs), records)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn self_diff_is_empty(devices in port_set().prop_flat_map(devices_on_ports)) {
        let s = snapshot(1, devices);
        prop_assert!(diff(Some(&s), &s).is_empty());
    }

    #[test]
    fn first_capture_is_silent(devices in port_set().prop_flat_map(devices_on_ports)) {
        let s = snapshot(1, devices);
        prop_assert!(diff(None, &s).is_empty());
    }

    #[test]
    fn disjoint_snapshots_replace_everything((a, b) in disjoint_device_lists()) {
        let previous = snapshot(1, a);
        let current = snapshot(2, b);

        let events = diff(Some(&previous), &current);
        prop_assert_eq!(events.len(), previous.len() + current.len());

        let disconnects = events.iter().filter(|e| e.kind() == EventKind::Disconnected).count();
        let connects = events.iter().filter(|e| e.kind() == EventKind::Connected).count();
        prop_assert_eq!(disconnects, previous.len());
        prop_assert_eq!(connects, current.len());

        let first_connect = events
            .iter()
            .position(|e| e.kind() == EventKind::Connected)
            .unwrap_or(events.len());
        prop_assert!(events[first_connect..].iter().all(|e| e.kind() == EventKind::Connected));
    }

    #[test]
    fn renamed_devices_produce_no_events(
        devices in port_set().prop_flat_map(devices_on_ports),
        new_name in "[A-Za-z]{1,8}",
    ) {
        let renamed: Vec<DeviceRecord> = devices
            .iter()
            .map(|d| {
                let ports = d.port_numbers().unwrap_or_default().to_vec();
                DeviceRecord::new(d.vendor_id(), d.product_id())
                    .with_product(new_name.clone())
                    .with_port_path(1, ports)
            })
            .collect();

        let previous = snapshot(1, devices);
        let current = snapshot(2, renamed);
        prop_assert!(diff(Some(&previous), &current).is_empty());
    }

    #[test]
    fn events_within_a_kind_are_sorted((a, b) in disjoint_device_lists()) {
        let events = diff(Some(&snapshot(1, a)), &snapshot(2, b));

        for kind in [EventKind::Disconnected, EventKind::Connected] {
            let keys: Vec<_> = events
                .iter()
                .filter(|e| e.kind() == kind)
                .map(|e| e.device().identity())
                .collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(keys, sorted);
        }
    }

    #[test]
    fn applying_the_diff_reaches_current(
        before in port_set().prop_flat_map(devices_on_ports),
        after in port_set().prop_flat_map(devices_on_ports),
    ) {
        let previous = snapshot(1, before);
        let current = snapshot(2, after);

        let mut present: BTreeSet<_> = previous.entries().map(|(k, _)| k.clone()).collect();
        for event in diff(Some(&previous), &current) {
            let key = event.device().identity();
            match event.kind() {
                EventKind::Disconnected => {
                    prop_assert!(present.remove(&key));
                }
                EventKind::Connected => {
                    prop_assert!(present.insert(key));
                }
            }
        }

        let expected: BTreeSet<_> = current.entries().map(|(k, _)| k.clone()).collect();
        prop_assert_eq!(present, expected);
    }
}

// ============================================================================
// Concrete Scenarios
// ============================================================================

#[test]
fn scenario_device_removed() {
    let a = DeviceRecord::new(0x1234, 0x5678);
    let events = diff(Some(&snapshot(1, vec![a.clone()])), &snapshot(2, vec![]));

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), EventKind::Disconnected);
    assert_eq!(events[0].device(), &a);
}

#[test]
fn scenario_device_added() {
    let b = DeviceRecord::new(0xABCD, 0x0001);
    let events = diff(Some(&snapshot(1, vec![])), &snapshot(2, vec![b.clone()]));

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), EventKind::Connected);
    assert_eq!(events[0].device(), &b);
}

#[test]
fn scenario_device_added_alongside_existing() {
    let a = DeviceRecord::new(0x1234, 0x5678);
    let b = DeviceRecord::new(0xABCD, 0x0001);
    let events = diff(
        Some(&snapshot(1, vec![a.clone()])),
        &snapshot(2, vec![a, b.clone()]),
    );

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), EventKind::Connected);
    assert_eq!(events[0].device(), &b);
}
