//! Integration tests for device reservation and attachment

mod common;

use aotforge::{AotForgeError, DeviceState};
use common::{sig, Harness};

#[test]
fn test_contention_scenario_detach_frees_devices() {
    // Inventory has 4 free devices; A and B take 2 each, C must wait for
    // A to detach before its reservation can succeed.
    let harness = Harness::new(4);

    let session_a = harness.session("model-a", 2);
    let session_b = harness.session("model-b", 2);
    let session_c = harness.session("model-c", 2);

    session_a.compile(sig(vec![8])).unwrap();
    session_b.compile(sig(vec![8])).unwrap();
    assert_eq!(harness.registry.free_count().unwrap(), 0);

    let err = session_c.compile(sig(vec![8])).unwrap_err();
    assert!(matches!(
        err,
        AotForgeError::InsufficientDevices {
            requested: 2,
            free: 0
        }
    ));
    assert!(err.is_recoverable());

    session_a.detach().unwrap();
    assert_eq!(harness.registry.free_count().unwrap(), 2);

    session_c.compile(sig(vec![8])).unwrap();
    assert_eq!(harness.registry.free_count().unwrap(), 0);
}

#[test]
fn test_concurrent_sessions_never_overlap() {
    let harness = Harness::new(6);

    let session_a = harness.session("a", 2);
    let session_b = harness.session("b", 3);
    session_a.compile(sig(vec![4])).unwrap();
    session_b.compile(sig(vec![4])).unwrap();

    let occupancy = harness.registry.occupancy().unwrap();
    let devices_a = occupancy.get(&session_a.id()).unwrap();
    let devices_b = occupancy.get(&session_b.id()).unwrap();

    assert_eq!(devices_a.len(), 2);
    assert_eq!(devices_b.len(), 3);
    assert!(devices_a.iter().all(|d| !devices_b.contains(d)));
}

#[test]
fn test_failed_reservation_has_no_side_effects() {
    let harness = Harness::new(3);

    let before = harness.registry.inventory_snapshot().unwrap();
    let err = harness.registry.reserve(4).unwrap_err();
    assert!(matches!(err, AotForgeError::InsufficientDevices { .. }));

    let after = harness.registry.inventory_snapshot().unwrap();
    assert_eq!(before, after);
    assert!(after.iter().all(|d| d.state == DeviceState::Free));
}

#[test]
fn test_snapshot_reflects_session_ownership() {
    let harness = Harness::new(2);
    let session = harness.session("m", 2);
    session.compile(sig(vec![4])).unwrap();

    let snapshot = harness.registry.inventory_snapshot().unwrap();
    assert!(snapshot
        .iter()
        .all(|d| d.state == DeviceState::Attached && d.owner == Some(session.id())));

    session.destroy().unwrap();
    let snapshot = harness.registry.inventory_snapshot().unwrap();
    assert!(snapshot
        .iter()
        .all(|d| d.state == DeviceState::Free && d.owner.is_none()));
}

#[test]
fn test_release_is_idempotent_through_session() {
    let harness = Harness::new(1);
    let session = harness.session("m", 1);

    session.compile(sig(vec![4])).unwrap();
    session.detach().unwrap();
    // Second detach is a no-op
    session.detach().unwrap();
    assert_eq!(harness.registry.free_count().unwrap(), 1);
}
