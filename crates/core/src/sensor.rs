// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sensor names, readings and the reading cache.
//!
//! Sensor names form a closed set plus two synthetic families:
//! `env:<NAME>` for environment-variable sensors and
//! `force_check:<reason>` for readings injected purely to trigger a
//! re-evaluation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// TCP reachability probe.
pub const TCP: &str = "tcp";
/// Externally visible IPv4 address.
pub const PUBLIC_IPV4: &str = "public_ipv4";
/// Externally visible IPv6 address (/64 prefix, host bits zeroed).
pub const PUBLIC_IPV6: &str = "public_ipv6";
/// LAN address of the preferred default-route interface.
pub const LOCAL_IPV4: &str = "local_ipv4";
/// Computed online state. Never read from the cache; conditions against
/// this name reference the policy output.
pub const ONLINE: &str = "online";

/// The network-derived sensors whose conditions never match while the
/// computed online state is false.
pub const NETWORK_SENSORS: [&str; 3] = [PUBLIC_IPV4, PUBLIC_IPV6, LOCAL_IPV4];

/// Sensor name for an environment variable.
pub fn env_sensor(var: &str) -> String {
    format!("env:{var}")
}

/// Synthetic sensor name for a forced re-evaluation.
pub fn force_check_sensor(reason: &str) -> String {
    format!("force_check:{reason}")
}

/// Whether a sensor name belongs to the network-derived set.
pub fn is_network_sensor(sensor: &str) -> bool {
    NETWORK_SENSORS.contains(&sensor)
}

/// One immutable, timestamped observation from a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor: String,
    /// Epoch milliseconds at observation time.
    pub timestamp_ms: u64,
    /// Boolean observation (used by the tcp probe).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    /// Address observation (used by the ip probes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    /// String observation (used by the env probes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Probe failure, carried as data. Errors compare by message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Measured probe latency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl SensorReading {
    /// A reading with no observation fields set.
    pub fn new(sensor: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            sensor: sensor.into(),
            timestamp_ms,
            online: None,
            ip: None,
            value: None,
            error: None,
            latency_ms: None,
        }
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Equality over the observation itself, ignoring timestamp and
    /// latency. Duplicate suppression in the state manager keys off this,
    /// not full field equality, so a re-probe that sees the same world
    /// does not count as a change.
    pub fn semantically_equals(&self, other: &SensorReading) -> bool {
        self.sensor == other.sensor
            && self.online == other.online
            && self.ip == other.ip
            && self.value == other.value
            && self.error == other.error
    }

    /// The observation rendered for matching and display: the address for
    /// ip sensors, the string value otherwise.
    pub fn display_value(&self) -> Option<String> {
        match (&self.ip, &self.value) {
            (Some(ip), _) => Some(ip.to_string()),
            (None, Some(v)) => Some(v.clone()),
            (None, None) => None,
        }
    }
}

/// Latest reading per sensor. Owned exclusively by the state manager;
/// everyone else sees it through `&` during evaluation.
#[derive(Debug, Clone, Default)]
pub struct SensorCache {
    readings: HashMap<String, SensorReading>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reading under its sensor name. Returns whether the stored
    /// observation semantically changed versus the prior entry.
    pub fn update(&mut self, reading: SensorReading) -> bool {
        let changed = match self.readings.get(&reading.sensor) {
            Some(prev) => !prev.semantically_equals(&reading),
            None => true,
        };
        self.readings.insert(reading.sensor.clone(), reading);
        changed
    }

    pub fn get(&self, sensor: &str) -> Option<&SensorReading> {
        self.readings.get(sensor)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SensorReading)> {
        self.readings.iter()
    }

    /// All readings, for cache persistence. Sorted by sensor name so the
    /// saved form is deterministic.
    pub fn to_readings(&self) -> Vec<SensorReading> {
        let mut readings: Vec<SensorReading> = self.readings.values().cloned().collect();
        readings.sort_by(|a, b| a.sensor.cmp(&b.sensor));
        readings
    }

    /// Re-seed from persisted readings. An empty list leaves the cache
    /// untouched.
    pub fn restore(&mut self, readings: Vec<SensorReading>) {
        for reading in readings {
            self.readings.insert(reading.sensor.clone(), reading);
        }
    }
}

#[cfg(test)]
#[path = "sensor_tests.rs"]
mod tests;
