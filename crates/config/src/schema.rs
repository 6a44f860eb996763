// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serde mirror of the on-disk HCL blocks.
//!
//! These structs stay close to the file format; nothing here is
//! validated or resolved. `convert` turns them into the daemon-facing
//! `Config`.

use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;

/// Whole config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub verbose: Option<i64>,
    /// Global environment, lowest merge precedence.
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub exports: Option<ExportsBlock>,
    #[serde(default)]
    pub ssh: Option<SshBlock>,
    #[serde(default)]
    pub companion: Option<CompanionDefaultsBlock>,
    #[serde(default)]
    pub log: Option<LogBlock>,
    #[serde(default)]
    pub probes: Option<ProbesBlock>,
    #[serde(default)]
    pub location_hooks: Option<HooksBlock>,
    #[serde(default)]
    pub context_hooks: Option<HooksBlock>,
    /// `location "<name>" { … }`, declaration order preserved.
    #[serde(default)]
    pub location: IndexMap<String, LocationBlock>,
    /// `context "<name>" { … }`, declaration order is evaluation order.
    #[serde(default)]
    pub context: IndexMap<String, ContextBlock>,
    /// `tunnel "<alias>" { … }`.
    #[serde(default)]
    pub tunnel: IndexMap<String, TunnelBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportsBlock {
    #[serde(default)]
    pub dotenv: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    /// `ipv4` or `ipv6`.
    #[serde(default)]
    pub preferred_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshBlock {
    #[serde(default)]
    pub server_alive_interval: Option<u64>,
    #[serde(default)]
    pub server_alive_count_max: Option<u32>,
    #[serde(default)]
    pub reconnect_enabled: Option<bool>,
    #[serde(default)]
    pub initial_backoff: Option<DurationValue>,
    #[serde(default)]
    pub max_backoff: Option<DurationValue>,
    #[serde(default)]
    pub backoff_factor: Option<f64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub connect_window: Option<DurationValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanionDefaultsBlock {
    #[serde(default)]
    pub history_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogBlock {
    #[serde(default)]
    pub ring_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbesBlock {
    #[serde(default)]
    pub tcp_target: Option<String>,
    #[serde(default)]
    pub tcp_interval: Option<DurationValue>,
    #[serde(default)]
    pub tcp_timeout: Option<DurationValue>,
    #[serde(default)]
    pub ip_interval: Option<DurationValue>,
    #[serde(default)]
    pub ipv4_resolver: Option<String>,
    #[serde(default)]
    pub ipv6_resolver: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksBlock {
    #[serde(default)]
    pub on_enter: Vec<String>,
    #[serde(default)]
    pub on_leave: Vec<String>,
    #[serde(default)]
    pub timeout: Option<DurationValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationBlock {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub conditions: Option<ConditionsBlock>,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub hooks: Option<HooksBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextBlock {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub conditions: Option<ConditionsBlock>,
    #[serde(default)]
    pub actions: Option<ActionsBlock>,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub hooks: Option<HooksBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionsBlock {
    #[serde(default)]
    pub connect: Vec<String>,
    #[serde(default)]
    pub disconnect: Vec<String>,
}

/// The `conditions { … }` grammar. Sensor attributes are patterns
/// (single or list); `online` is a bool; `env` maps variable names to
/// patterns; `any`/`all` nest the same grammar.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConditionsBlock {
    #[serde(default)]
    pub public_ip: Option<OneOrMany<String>>,
    #[serde(default)]
    pub public_ipv4: Option<OneOrMany<String>>,
    #[serde(default)]
    pub public_ipv6: Option<OneOrMany<String>>,
    #[serde(default)]
    pub local_ipv4: Option<OneOrMany<String>>,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default)]
    pub any: Option<Box<ConditionsBlock>>,
    #[serde(default)]
    pub all: Option<Box<ConditionsBlock>>,
}

impl ConditionsBlock {
    /// Whether the block carries any of the legacy simple-map keys.
    pub fn has_simple_entries(&self) -> bool {
        self.public_ip.is_some()
            || self.public_ipv4.is_some()
            || self.public_ipv6.is_some()
            || self.local_ipv4.is_some()
            || self.online.is_some()
            || !self.env.is_empty()
    }

    /// Whether the block carries structured `any`/`all` groups.
    pub fn has_groups(&self) -> bool {
        self.any.is_some() || self.all.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelBlock {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub companion: IndexMap<String, CompanionBlock>,
    #[serde(default)]
    pub hooks: Option<TunnelHooksBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelHooksBlock {
    #[serde(default)]
    pub before_connect: Vec<String>,
    #[serde(default)]
    pub after_connect: Vec<String>,
    #[serde(default)]
    pub timeout: Option<DurationValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanionBlock {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    /// `completion` (default) or `string`.
    #[serde(default)]
    pub wait_mode: Option<String>,
    #[serde(default)]
    pub wait_for: Option<String>,
    #[serde(default)]
    pub timeout: Option<DurationValue>,
    #[serde(default)]
    pub ready_delay: Option<DurationValue>,
    /// `block` (default) or `continue`.
    #[serde(default)]
    pub on_failure: Option<String>,
    #[serde(default)]
    pub keep_alive: Option<bool>,
    #[serde(default)]
    pub auto_restart: Option<bool>,
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub stop_signal: Option<String>,
}

/// A single value or a list of them. The conditions grammar writes
/// `public_ip ["a", "b"]`, but a bare string is accepted too.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(vs) => vs,
        }
    }
}

/// A duration written either as bare seconds or as a suffixed string
/// like `"30s"`, `"5m"`, `"1h"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub fn resolve(&self) -> Result<Duration, String> {
        match self {
            DurationValue::Seconds(s) => Ok(Duration::from_secs(*s)),
            DurationValue::Text(s) => parse_duration(s),
        }
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h".
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (num_str, suffix) = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, ""));

    let num: u64 = num_str.parse().map_err(|_| format!("invalid number in duration: {s}"))?;

    let multiplier = match suffix.trim() {
        "ms" | "millis" | "millisecond" | "milliseconds" => {
            return Ok(Duration::from_millis(num));
        }
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86400,
        other => return Err(format!("unknown duration suffix: {other}")),
    };

    Ok(Duration::from_secs(num * multiplier))
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
