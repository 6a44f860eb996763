// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status payload types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub online: bool,
    pub online_source: String,
    pub context: String,
    pub context_display: String,
    pub location: String,
    pub location_display: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ipv6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ipv4: Option<String>,
    pub uptime_secs: u64,
    #[serde(default)]
    pub tunnels: Vec<TunnelStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelStatus {
    pub alias: String,
    /// One of `disconnected`, `connecting`, `connected`, `backoff`,
    /// `gave_up`.
    pub state: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Epoch ms of the current session start, when connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_since_ms: Option<u64>,
    /// Epoch ms of the next reconnect attempt, when backing off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_ms: Option<u64>,
}
