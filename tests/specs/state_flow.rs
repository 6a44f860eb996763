// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-core specs: boot, context selection, idempotence, ordering.

use overseer_core::test_support::{ipv4_reading, rule_matching_cidr, tcp_reading};
use overseer_core::{
    ChangedField, Clock, FakeClock, RuleEngine, StateTransition, TcpPriorityPolicy,
};
use overseer_daemon::state::{StateHandle, StateManager};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn manager(
    rules: Vec<overseer_core::Rule>,
) -> (StateHandle, mpsc::Receiver<StateTransition>, FakeClock) {
    let clock = FakeClock::new();
    let engine = RuleEngine::new(rules, vec![], indexmap::IndexMap::new());
    let (manager, handle, transitions) =
        StateManager::new(engine, Box::new(TcpPriorityPolicy::default()), clock.clone());
    tokio::spawn(manager.run(CancellationToken::new()));
    (handle, transitions, clock)
}

/// Boot offline, then a single `tcp online` reading: exactly one
/// transition, online via tcp, all address fields on the zero sentinel.
#[tokio::test]
async fn boot_offline_then_online_via_tcp() {
    let (handle, mut transitions, clock) = manager(vec![]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));

    let t = transitions.recv().await.unwrap();
    assert_eq!(t.changed, vec![ChangedField::Online]);
    assert!(t.to.online);
    assert_eq!(t.to.online_source, "tcp");
    assert_eq!(t.to.public_ipv4, Some("0.0.0.0".parse().unwrap()));
    assert_eq!(t.to.public_ipv6, Some("::".parse().unwrap()));
    assert_eq!(t.to.local_ipv4, Some("0.0.0.0".parse().unwrap()));

    // Nothing else pending.
    drop(handle);
    assert!(transitions.recv().await.is_none());
}

/// An address reading after boot selects the matching context and the
/// transition reports both the address and context changes.
#[tokio::test]
async fn address_reading_selects_context() {
    let mut home = rule_matching_cidr("home", "203.0.113.0/24");
    home.actions.connect = vec!["nas".into()];
    let (handle, mut transitions, clock) = manager(vec![home]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    let _ = transitions.recv().await.unwrap();

    handle.submit(ipv4_reading(clock.epoch_ms(), "203.0.113.42"));
    let t = transitions.recv().await.unwrap();
    assert!(t.changed.contains(&ChangedField::Ipv4));
    assert!(t.changed.contains(&ChangedField::Context));
    assert_eq!(t.to.context, "home");
    assert_eq!(t.to.matched_rule, "home");
}

/// Re-submitting an identical reading emits nothing.
#[tokio::test]
async fn duplicate_reading_is_idempotent() {
    let (handle, mut transitions, clock) = manager(vec![]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    let _ = transitions.recv().await.unwrap();

    clock.advance(std::time::Duration::from_secs(5));
    handle.submit(tcp_reading(clock.epoch_ms(), true));

    drop(handle);
    assert!(transitions.recv().await.is_none(), "duplicate must not emit");
}

/// Transitions chain: every `from` equals the previous `to`, and every
/// emitted transition carries at least one changed field.
#[tokio::test]
async fn transitions_chain_and_never_carry_empty_changes() {
    let (handle, mut transitions, clock) = manager(vec![]);

    let flips = [true, false, true, false];
    for online in flips {
        handle.submit(tcp_reading(clock.epoch_ms(), online));
        clock.advance(std::time::Duration::from_secs(1));
    }
    drop(handle);

    let mut previous: Option<StateTransition> = None;
    while let Some(t) = transitions.recv().await {
        assert!(!t.changed.is_empty());
        if let Some(previous) = &previous {
            assert_eq!(t.from, previous.to);
        }
        previous = Some(t);
    }
    assert_eq!(previous.map(|t| t.to.online), Some(false));
}

/// Network conditions never match while offline, so losing the tcp
/// signal also drops the context that matched on the address.
#[tokio::test]
async fn offline_snapshot_fails_network_conditions() {
    let home = rule_matching_cidr("home", "203.0.113.0/24");
    let (handle, mut transitions, clock) = manager(vec![home]);

    handle.submit(tcp_reading(clock.epoch_ms(), true));
    let _ = transitions.recv().await.unwrap();
    handle.submit(ipv4_reading(clock.epoch_ms(), "203.0.113.42"));
    let t = transitions.recv().await.unwrap();
    assert_eq!(t.to.context, "home");

    clock.advance(std::time::Duration::from_secs(1));
    handle.submit(tcp_reading(clock.epoch_ms(), false));
    let t = transitions.recv().await.unwrap();
    assert!(!t.to.online);
    assert_eq!(t.to.context, "unknown", "address rule must not match offline");
}
