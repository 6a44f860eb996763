// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use overseer_core::test_support::{ipv4_reading, rule_matching_cidr, tcp_reading};
use overseer_core::{ChangedField, FakeClock, TcpPriorityPolicy};

fn manager_with(
    rules: Vec<overseer_core::Rule>,
) -> (StateHandle, mpsc::Receiver<StateTransition>, FakeClock) {
    let clock = FakeClock::new();
    let engine = RuleEngine::new(rules, vec![], indexmap::IndexMap::new());
    let (manager, handle, transitions) =
        StateManager::new(engine, Box::new(TcpPriorityPolicy::default()), clock.clone());
    tokio::spawn(manager.run(tokio_util::sync::CancellationToken::new()));
    (handle, transitions, clock)
}

#[tokio::test]
async fn boot_offline_to_online_via_tcp() {
    let (handle, mut transitions, clock) = manager_with(vec![]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));

    let t = transitions.recv().await.unwrap();
    assert_eq!(t.changed, vec![ChangedField::Online]);
    assert!(t.to.online);
    assert_eq!(t.to.online_source, "tcp");
    assert_eq!(t.to.public_ipv4, Some("0.0.0.0".parse().unwrap()));
    assert_eq!(t.to.public_ipv6, Some("::".parse().unwrap()));
    assert_eq!(t.to.local_ipv4, Some("0.0.0.0".parse().unwrap()));
    assert_eq!(t.trigger, "tcp");
}

#[tokio::test]
async fn ip_reading_selects_context() {
    let mut rule = rule_matching_cidr("home", "203.0.113.0/24");
    rule.actions.connect = vec!["nas".into()];
    let (handle, mut transitions, clock) = manager_with(vec![rule]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    let _ = transitions.recv().await.unwrap();

    handle.submit(ipv4_reading(clock.epoch_ms(), "203.0.113.42"));
    let t = transitions.recv().await.unwrap();

    assert!(t.changed.contains(&ChangedField::Ipv4));
    assert!(t.changed.contains(&ChangedField::Context));
    assert_eq!(t.to.context, "home");
    assert_eq!(t.to.matched_rule, "home");
    assert_eq!(t.to.public_ipv4, Some("203.0.113.42".parse().unwrap()));
}

#[tokio::test]
async fn duplicate_reading_emits_nothing() {
    let (handle, mut transitions, clock) = manager_with(vec![]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    let _ = transitions.recv().await.unwrap();

    // Same observation again, later timestamp.
    clock.advance(std::time::Duration::from_secs(1));
    handle.submit(tcp_reading(clock.epoch_ms(), true));
    handle.force_check("nudge-after-duplicate");

    // The force check does not change state either, so the stream stays
    // empty; closing the handle ends it.
    drop(handle);
    assert!(transitions.recv().await.is_none());
}

#[tokio::test]
async fn transitions_chain_from_equals_previous_to() {
    let (handle, mut transitions, clock) = manager_with(vec![]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    clock.advance(std::time::Duration::from_secs(1));
    handle.submit(tcp_reading(clock.epoch_ms(), false));
    clock.advance(std::time::Duration::from_secs(1));
    handle.submit(tcp_reading(clock.epoch_ms(), true));

    let t1 = transitions.recv().await.unwrap();
    let t2 = transitions.recv().await.unwrap();
    let t3 = transitions.recv().await.unwrap();
    assert_eq!(t2.from, t1.to);
    assert_eq!(t3.from, t2.to);
    assert!(!t2.changed.is_empty() && !t3.changed.is_empty());
}

#[tokio::test]
async fn snapshot_mirror_tracks_commits() {
    let (handle, mut transitions, clock) = manager_with(vec![]);
    assert!(!handle.snapshot().online);

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    let _ = transitions.recv().await.unwrap();
    assert!(handle.snapshot().online);
}

#[tokio::test]
async fn force_check_uses_the_synthetic_sensor_name() {
    let mut rule = rule_matching_cidr("home", "203.0.113.0/24");
    rule.condition = Some(overseer_core::Condition::online(true));
    let (handle, mut transitions, clock) = manager_with(vec![rule]);

    // Seed the cache without matching: offline, no rule.
    handle.submit(ipv4_reading(clock.epoch_ms(), "203.0.113.42"));
    let t = transitions.recv().await.unwrap();
    assert!(t.to.online, "ipv4 fallback counts as online");
    assert_eq!(t.trigger, "public_ipv4");

    // Swap in an engine whose rule no longer matches, then force-check.
    handle.set_engine(RuleEngine::default());
    handle.force_check("config_reload");
    let t = transitions.recv().await.unwrap();
    assert_eq!(t.trigger, "force_check:config_reload");
    assert_eq!(t.to.context, "unknown");
}

#[tokio::test]
async fn subscriber_callbacks_fire_per_transition() {
    let (handle, mut transitions, clock) = manager_with(vec![]);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        handle.subscribe(move |t| seen.lock().push(t.trigger.clone()));
    }

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    let _ = transitions.recv().await.unwrap();
    assert_eq!(seen.lock().as_slice(), ["tcp"]);
}

#[tokio::test]
async fn export_and_restore_cache_roundtrip() {
    let (handle, mut transitions, clock) = manager_with(vec![]);
    handle.submit(tcp_reading(clock.epoch_ms(), true));
    handle.submit(ipv4_reading(clock.epoch_ms(), "203.0.113.42"));
    let _ = transitions.recv().await.unwrap();
    let _ = transitions.recv().await.unwrap();

    let saved = handle.export_cache().await;
    assert_eq!(saved.len(), 2);

    // A fresh manager restored from the saved cache reports the same
    // derived state.
    let (restored_handle, mut restored_transitions, _clock) = manager_with(vec![]);
    restored_handle.restore_cache(saved.clone());
    let t = restored_transitions.recv().await.unwrap();
    assert_eq!(t.trigger, "restore");
    assert!(t.to.online);
    assert_eq!(t.to.public_ipv4, Some("203.0.113.42".parse().unwrap()));

    let roundtripped = restored_handle.export_cache().await;
    assert_eq!(roundtripped, saved);
}

#[tokio::test]
async fn restore_empty_cache_is_a_noop() {
    let (handle, mut transitions, _clock) = manager_with(vec![]);
    handle.restore_cache(Vec::new());
    drop(handle);
    assert!(transitions.recv().await.is_none());
}

#[tokio::test]
async fn error_readings_never_fail_the_manager() {
    let (handle, mut transitions, clock) = manager_with(vec![]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    let _ = transitions.recv().await.unwrap();

    // An errored ipv4 probe wipes the cached address but the manager
    // keeps serving.
    handle.submit(
        SensorReading::new(PUBLIC_IPV4, clock.epoch_ms()).with_error("connection refused"),
    );
    clock.advance(std::time::Duration::from_secs(60));
    handle.submit(tcp_reading(clock.epoch_ms(), false));
    let t = transitions.recv().await.unwrap();
    assert!(!t.to.online);
}
