//! Integration tests for session liveness and device reclamation

mod common;

use std::time::Duration;

use aotforge::{SessionLifecycleManager, SessionSlot, SessionState};
use common::{sig, Harness};

#[test]
fn test_dropping_last_reference_releases_devices() {
    let harness = Harness::new(2);
    let manager = SessionLifecycleManager::new();

    {
        let session = harness.session("m", 2);
        manager.register(&session).unwrap();
        session.compile(sig(vec![8])).unwrap();
        assert_eq!(harness.registry.free_count().unwrap(), 0);
    }

    // Last owner gone: Drop released the devices, sweep prunes the entry
    assert_eq!(harness.registry.free_count().unwrap(), 2);
    assert_eq!(manager.sweep().unwrap(), 1);
    assert_eq!(manager.live_count().unwrap(), 0);
}

#[test]
fn test_reassign_releases_before_new_session_reserves() {
    // Pool of 2: the old session holds both devices, so the new session
    // can only compile if reassignment released them first.
    let harness = Harness::new(2);
    let manager = SessionLifecycleManager::new();

    let mut slot: SessionSlot = None;
    manager
        .reassign(&mut slot, harness.session("old", 2))
        .unwrap();
    slot.as_ref().unwrap().compile(sig(vec![8])).unwrap();
    assert_eq!(harness.registry.free_count().unwrap(), 0);

    let new_session = harness.session("new", 2);
    manager.reassign(&mut slot, new_session).unwrap();
    assert_eq!(harness.registry.free_count().unwrap(), 2);

    slot.as_ref().unwrap().compile(sig(vec![8])).unwrap();
    assert_eq!(harness.registry.free_count().unwrap(), 0);
}

#[test]
fn test_detach_idle_frees_devices_keeps_executable() {
    let harness = Harness::new(1);
    let manager = SessionLifecycleManager::new();

    let session = harness.session("m", 1);
    manager.register(&session).unwrap();
    session.compile(sig(vec![8])).unwrap();

    std::thread::sleep(Duration::from_millis(10));
    let detached = manager.detach_idle(Duration::from_millis(1)).unwrap();
    assert_eq!(detached, 1);
    assert_eq!(session.state().unwrap(), SessionState::Detached);
    assert_eq!(harness.registry.free_count().unwrap(), 1);

    // Reattachment on next use, still no recompilation
    assert!(session
        .run(&[aotforge::HostTensor::zeros(vec![8], aotforge::DType::F32)])
        .is_ok());
    assert_eq!(harness.compiler.compile_calls(), 1);
}

#[test]
fn test_detach_idle_skips_recently_used() {
    let harness = Harness::new(1);
    let manager = SessionLifecycleManager::new();

    let session = harness.session("m", 1);
    manager.register(&session).unwrap();
    session.compile(sig(vec![8])).unwrap();

    let detached = manager.detach_idle(Duration::from_secs(3600)).unwrap();
    assert_eq!(detached, 0);
    assert_eq!(session.state().unwrap(), SessionState::Ready);
}

#[test]
fn test_destroy_all_then_reuse_pool() {
    let harness = Harness::new(4);
    let manager = SessionLifecycleManager::new();

    let a = harness.session("a", 2);
    let b = harness.session("b", 2);
    manager.register(&a).unwrap();
    manager.register(&b).unwrap();
    a.compile(sig(vec![8])).unwrap();
    b.compile(sig(vec![8])).unwrap();

    assert_eq!(manager.destroy_all().unwrap(), 2);
    assert_eq!(harness.registry.free_count().unwrap(), 4);

    // Fresh session can claim the whole pool
    let c = harness.session("c", 4);
    c.compile(sig(vec![8])).unwrap();
    assert_eq!(harness.registry.free_count().unwrap(), 0);
}
