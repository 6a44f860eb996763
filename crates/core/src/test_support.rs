// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared with other crates' tests.

use crate::condition::Condition;
use crate::rules::{Actions, Hooks, Location, Rule};
use crate::sensor::{SensorReading, PUBLIC_IPV4, TCP};

pub fn tcp_reading(timestamp_ms: u64, online: bool) -> SensorReading {
    SensorReading::new(TCP, timestamp_ms).with_online(online)
}

#[allow(clippy::unwrap_used)]
pub fn ipv4_reading(timestamp_ms: u64, ip: &str) -> SensorReading {
    SensorReading::new(PUBLIC_IPV4, timestamp_ms).with_ip(ip.parse().unwrap())
}

pub fn rule_named(name: &str) -> Rule {
    Rule {
        name: name.into(),
        display_name: None,
        locations: Vec::new(),
        condition: None,
        actions: Actions::default(),
        environment: indexmap::IndexMap::new(),
        hooks: Hooks::default(),
    }
}

pub fn rule_matching_cidr(name: &str, cidr: &str) -> Rule {
    Rule {
        condition: Some(Condition::Match {
            sensor: PUBLIC_IPV4.into(),
            pattern: cidr.into(),
        }),
        ..rule_named(name)
    }
}

pub fn location_named(name: &str, condition: Option<Condition>) -> Location {
    Location {
        name: name.into(),
        display_name: None,
        condition,
        environment: indexmap::IndexMap::new(),
        hooks: Hooks::default(),
    }
}
