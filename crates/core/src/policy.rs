// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Online policies: how the sensor cache resolves to a single
//! `(online, source)` verdict.
//!
//! Policies are pure and owned by the state manager; the hysteresis
//! wrapper keeps its confirmation counters between evaluations, which is
//! why `evaluate` takes `&mut self`.

use crate::sensor::{SensorCache, PUBLIC_IPV4, PUBLIC_IPV6, TCP};
use std::net::IpAddr;
use std::time::Duration;

/// Source name reported when no sensor informs the verdict.
pub const SOURCE_NONE: &str = "none";

/// How long a tcp reading counts as fresh. Matches the default probe
/// cadence.
pub const DEFAULT_TCP_FRESHNESS: Duration = Duration::from_secs(30);

/// Resolved online state plus the sensor that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineVerdict {
    pub online: bool,
    pub source: String,
}

impl OnlineVerdict {
    pub fn new(online: bool, source: impl Into<String>) -> Self {
        Self { online, source: source.into() }
    }

    pub fn offline_none() -> Self {
        Self::new(false, SOURCE_NONE)
    }
}

/// Resolves the sensor cache to an online verdict.
pub trait OnlinePolicy: Send {
    fn evaluate(&mut self, cache: &SensorCache, now_ms: u64) -> OnlineVerdict;

    /// Drop any accumulated evaluation state.
    fn reset(&mut self);
}

/// TCP-priority policy: a fresh, non-errored `tcp` reading wins outright.
/// Without one, a usable public IPv4 (not link-local) means online, then
/// a public IPv6, then offline with source `"none"`.
///
/// The `169.254.0.0/16` rejection lives only here, not in generic
/// condition matching.
pub struct TcpPriorityPolicy {
    tcp_freshness: Duration,
}

impl TcpPriorityPolicy {
    pub fn new(tcp_freshness: Duration) -> Self {
        Self { tcp_freshness }
    }
}

impl Default for TcpPriorityPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_FRESHNESS)
    }
}

impl OnlinePolicy for TcpPriorityPolicy {
    fn evaluate(&mut self, cache: &SensorCache, now_ms: u64) -> OnlineVerdict {
        if let Some(reading) = cache.get(TCP) {
            let age_ms = now_ms.saturating_sub(reading.timestamp_ms);
            let fresh = age_ms < self.tcp_freshness.as_millis() as u64;
            if fresh && reading.error.is_none() {
                if let Some(online) = reading.online {
                    return OnlineVerdict::new(online, TCP);
                }
            }
        }

        if let Some(reading) = cache.get(PUBLIC_IPV4) {
            if reading.error.is_none() {
                if let Some(IpAddr::V4(v4)) = reading.ip {
                    if !v4.is_link_local() {
                        return OnlineVerdict::new(true, PUBLIC_IPV4);
                    }
                }
            }
        }

        if let Some(reading) = cache.get(PUBLIC_IPV6) {
            if reading.error.is_none() && matches!(reading.ip, Some(IpAddr::V6(_))) {
                return OnlineVerdict::new(true, PUBLIC_IPV6);
            }
        }

        OnlineVerdict::offline_none()
    }

    fn reset(&mut self) {}
}

/// Hysteresis wrapper: adopts the inner policy's first verdict
/// immediately, then flips only after `confirm_online` consecutive
/// online verdicts or `confirm_offline` consecutive offline verdicts.
/// An inner verdict agreeing with the current state resets the pending
/// counter.
pub struct HysteresisPolicy {
    inner: Box<dyn OnlinePolicy>,
    confirm_online: u32,
    confirm_offline: u32,
    online_streak: u32,
    offline_streak: u32,
    current: Option<OnlineVerdict>,
}

impl HysteresisPolicy {
    pub fn new(inner: Box<dyn OnlinePolicy>, confirm_online: u32, confirm_offline: u32) -> Self {
        Self {
            inner,
            confirm_online: confirm_online.max(1),
            confirm_offline: confirm_offline.max(1),
            online_streak: 0,
            offline_streak: 0,
            current: None,
        }
    }
}

impl OnlinePolicy for HysteresisPolicy {
    fn evaluate(&mut self, cache: &SensorCache, now_ms: u64) -> OnlineVerdict {
        let verdict = self.inner.evaluate(cache, now_ms);

        let current = match &mut self.current {
            None => {
                self.current = Some(verdict.clone());
                return verdict;
            }
            Some(current) => current,
        };

        if verdict.online == current.online {
            // Confirmation of the current state; any pending flip is off.
            current.source = verdict.source;
            self.online_streak = 0;
            self.offline_streak = 0;
        } else if verdict.online {
            self.online_streak += 1;
            self.offline_streak = 0;
            if self.online_streak >= self.confirm_online {
                *current = verdict;
                self.online_streak = 0;
            }
        } else {
            self.offline_streak += 1;
            self.online_streak = 0;
            if self.offline_streak >= self.confirm_offline {
                *current = verdict;
                self.offline_streak = 0;
            }
        }

        current.clone()
    }

    fn reset(&mut self) {
        self.online_streak = 0;
        self.offline_streak = 0;
        self.current = None;
        self.inner.reset();
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
