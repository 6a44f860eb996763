// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Condition algebra evaluated by the rule engine.
//!
//! Conditions form a small closed set of tagged variants; rules and
//! locations hold one `Condition` tree regardless of which configuration
//! form (simple map or structured `any`/`all` groups) produced it.
//!
//! Pattern semantics for `Match`: a pattern containing `/` is a CIDR
//! match on the reading's address, a pattern containing `*` is a
//! wildcard glob, anything else is an exact string match.

use crate::sensor::{is_network_sensor, SensorCache, ONLINE};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Pattern match against one sensor's observation.
    Match { sensor: String, pattern: String },
    /// Boolean match: the computed online state for sensor `online`,
    /// the reading's boolean field for anything else.
    Bool { sensor: String, value: bool },
    /// Every child must match. Empty matches.
    All(Vec<Condition>),
    /// At least one child must match. Empty never matches.
    Any(Vec<Condition>),
}

impl Condition {
    /// Shorthand for an exact `online` check.
    pub fn online(value: bool) -> Self {
        Condition::Bool { sensor: ONLINE.to_string(), value }
    }

    /// Whether this condition is exactly `online == false`. The rule
    /// engine gives such location conditions priority while offline.
    pub fn is_offline_check(&self) -> bool {
        matches!(self, Condition::Bool { sensor, value: false } if sensor == ONLINE)
    }

    pub fn evaluate(&self, cache: &SensorCache, online: bool) -> bool {
        match self {
            Condition::All(children) => children.iter().all(|c| c.evaluate(cache, online)),
            Condition::Any(children) => children.iter().any(|c| c.evaluate(cache, online)),
            Condition::Bool { sensor, value } => {
                if sensor == ONLINE {
                    return online == *value;
                }
                match cache.get(sensor) {
                    Some(reading) => reading.online == Some(*value),
                    None => false,
                }
            }
            Condition::Match { sensor, pattern } => {
                if sensor == ONLINE {
                    return pattern_matches(&online.to_string(), None, pattern);
                }
                // Network-derived sensors never match while offline.
                if is_network_sensor(sensor) && !online {
                    return false;
                }
                let Some(reading) = cache.get(sensor) else {
                    return false;
                };
                let Some(value) = reading.display_value() else {
                    return false;
                };
                pattern_matches(&value, reading.ip.as_ref(), pattern)
            }
        }
    }

    /// Every sensor name referenced anywhere in the tree. A structural
    /// fold; nothing is evaluated.
    pub fn required_sensors(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_sensors(&mut out);
        out
    }

    fn collect_sensors(&self, out: &mut BTreeSet<String>) {
        match self {
            Condition::Match { sensor, .. } | Condition::Bool { sensor, .. } => {
                out.insert(sensor.clone());
            }
            Condition::All(children) | Condition::Any(children) => {
                for child in children {
                    child.collect_sensors(out);
                }
            }
        }
    }
}

fn pattern_matches(value: &str, ip: Option<&std::net::IpAddr>, pattern: &str) -> bool {
    if pattern.contains('/') {
        let Ok(net) = pattern.parse::<IpNet>() else {
            return false;
        };
        let addr = match ip {
            Some(addr) => *addr,
            None => match value.parse() {
                Ok(addr) => addr,
                Err(_) => return false,
            },
        };
        return net.contains(&addr);
    }

    if pattern.contains('*') {
        return wildcard_matches(value, pattern);
    }

    value == pattern
}

/// Anchored wildcard match where `*` spans any run of characters.
fn wildcard_matches(value: &str, pattern: &str) -> bool {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    match regex::Regex::new(&format!("^{escaped}$")) {
        Ok(re) => re.is_match(value),
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;
