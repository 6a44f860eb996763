// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::sensor::{SensorReading, LOCAL_IPV4};
use yare::parameterized;

fn cache_with(readings: Vec<SensorReading>) -> SensorCache {
    let mut cache = SensorCache::new();
    for r in readings {
        cache.update(r);
    }
    cache
}

#[test]
fn empty_cache_is_offline_with_source_none() {
    let mut policy = TcpPriorityPolicy::default();
    let verdict = policy.evaluate(&SensorCache::new(), 1_000);
    assert_eq!(verdict, OnlineVerdict::offline_none());
}

#[test]
fn fresh_tcp_reading_wins_over_everything() {
    let cache = cache_with(vec![
        SensorReading::new(TCP, 1_000).with_online(false),
        SensorReading::new(PUBLIC_IPV4, 1_000).with_ip("203.0.113.42".parse().unwrap()),
        SensorReading::new(PUBLIC_IPV6, 1_000).with_ip("2001:db8::".parse().unwrap()),
    ]);
    let mut policy = TcpPriorityPolicy::default();
    let verdict = policy.evaluate(&cache, 2_000);
    assert_eq!(verdict, OnlineVerdict::new(false, TCP));
}

#[test]
fn tcp_true_reports_tcp_source() {
    let cache = cache_with(vec![SensorReading::new(TCP, 1_000).with_online(true)]);
    let mut policy = TcpPriorityPolicy::default();
    assert_eq!(policy.evaluate(&cache, 1_000), OnlineVerdict::new(true, TCP));
}

#[test]
fn stale_tcp_reading_falls_back_to_public_ipv4() {
    let cache = cache_with(vec![
        SensorReading::new(TCP, 0).with_online(false),
        SensorReading::new(PUBLIC_IPV4, 50_000).with_ip("203.0.113.42".parse().unwrap()),
    ]);
    let mut policy = TcpPriorityPolicy::default();
    // 60s after the tcp reading: stale under the 30s freshness window
    let verdict = policy.evaluate(&cache, 60_000);
    assert_eq!(verdict, OnlineVerdict::new(true, PUBLIC_IPV4));
}

#[test]
fn errored_tcp_reading_falls_back() {
    let cache = cache_with(vec![
        SensorReading::new(TCP, 1_000).with_online(true).with_error("i/o timeout"),
        SensorReading::new(PUBLIC_IPV6, 1_000).with_ip("2001:db8::".parse().unwrap()),
    ]);
    let mut policy = TcpPriorityPolicy::default();
    assert_eq!(policy.evaluate(&cache, 1_000), OnlineVerdict::new(true, PUBLIC_IPV6));
}

#[test]
fn link_local_ipv4_does_not_count_as_online() {
    let cache = cache_with(vec![
        SensorReading::new(PUBLIC_IPV4, 1_000).with_ip("169.254.12.7".parse().unwrap()),
    ]);
    let mut policy = TcpPriorityPolicy::default();
    assert_eq!(policy.evaluate(&cache, 1_000), OnlineVerdict::offline_none());
}

#[test]
fn ipv6_is_the_last_fallback() {
    let cache = cache_with(vec![
        SensorReading::new(PUBLIC_IPV6, 1_000).with_ip("2001:db8:1:2::".parse().unwrap()),
    ]);
    let mut policy = TcpPriorityPolicy::default();
    assert_eq!(policy.evaluate(&cache, 1_000), OnlineVerdict::new(true, PUBLIC_IPV6));
}

#[test]
fn local_ipv4_never_informs_online() {
    let cache = cache_with(vec![
        SensorReading::new(LOCAL_IPV4, 1_000).with_ip("192.168.1.20".parse().unwrap()),
    ]);
    let mut policy = TcpPriorityPolicy::default();
    assert_eq!(policy.evaluate(&cache, 1_000), OnlineVerdict::offline_none());
}

// --- hysteresis ---

/// Inner policy that replays a scripted sequence of verdicts.
struct Scripted {
    verdicts: Vec<OnlineVerdict>,
    pos: usize,
}

impl Scripted {
    fn new(bools: &[bool]) -> Self {
        Self {
            verdicts: bools.iter().map(|b| OnlineVerdict::new(*b, TCP)).collect(),
            pos: 0,
        }
    }
}

impl OnlinePolicy for Scripted {
    fn evaluate(&mut self, _cache: &SensorCache, _now_ms: u64) -> OnlineVerdict {
        let v = self.verdicts[self.pos.min(self.verdicts.len() - 1)].clone();
        self.pos += 1;
        v
    }

    fn reset(&mut self) {
        self.pos = 0;
    }
}

fn run_hysteresis(policy: &mut HysteresisPolicy, steps: usize) -> Vec<bool> {
    let cache = SensorCache::new();
    (0..steps).map(|_| policy.evaluate(&cache, 0).online).collect()
}

#[test]
fn hysteresis_adopts_first_verdict_immediately() {
    let mut policy = HysteresisPolicy::new(Box::new(Scripted::new(&[true])), 3, 2);
    assert_eq!(run_hysteresis(&mut policy, 1), vec![true]);
}

#[test]
fn hysteresis_requires_k_confirmations_to_go_online() {
    // offline, then online verdicts; K=3 means the flip lands on the
    // third consecutive online verdict.
    let inner = Scripted::new(&[false, true, true, true, true]);
    let mut policy = HysteresisPolicy::new(Box::new(inner), 3, 2);
    assert_eq!(run_hysteresis(&mut policy, 5), vec![false, false, false, true, true]);
}

#[test]
fn hysteresis_requires_l_confirmations_to_go_offline() {
    let inner = Scripted::new(&[true, false, false, false]);
    let mut policy = HysteresisPolicy::new(Box::new(inner), 3, 2);
    assert_eq!(run_hysteresis(&mut policy, 4), vec![true, true, false, false]);
}

#[test]
fn opposing_reading_resets_the_streak() {
    // One offline verdict between online verdicts restarts the online
    // count, so with K=2 the flip needs two in a row.
    let inner = Scripted::new(&[false, true, false, true, true]);
    let mut policy = HysteresisPolicy::new(Box::new(inner), 2, 2);
    assert_eq!(run_hysteresis(&mut policy, 5), vec![false, false, false, false, true]);
}

#[test]
fn reset_drops_current_state_and_streaks() {
    let inner = Scripted::new(&[true, false, true]);
    let mut policy = HysteresisPolicy::new(Box::new(inner), 3, 3);
    let cache = SensorCache::new();
    assert!(policy.evaluate(&cache, 0).online);
    policy.reset();
    // After reset the next verdict is adopted immediately again.
    assert!(policy.evaluate(&cache, 0).online);
}

#[parameterized(
    zero_becomes_one = { 0, 0 },
    ones = { 1, 1 },
)]
fn confirmation_counts_are_clamped_to_at_least_one(k: u32, l: u32) {
    let inner = Scripted::new(&[false, true, false]);
    let mut policy = HysteresisPolicy::new(Box::new(inner), k, l);
    // With counts clamped to 1, every verdict flips the state directly.
    assert_eq!(run_hysteresis(&mut policy, 3), vec![false, true, false]);
}
