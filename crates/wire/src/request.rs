// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request types sent by the CLI.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Current snapshot plus per-tunnel state.
    Status,
    /// Bring one tunnel up.
    Connect { alias: String },
    /// Bring one tunnel down, or all tunnels when no alias is given.
    Disconnect {
        #[serde(default)]
        alias: Option<String>,
    },
    /// Force a reconnect cycle for one tunnel.
    Reconnect { alias: String },
    /// Re-read the configuration file.
    Reload,
    /// Clear retry counters and force a state re-evaluation.
    Reset,
    /// Stream structured log entries. With `replay`, the last `lines`
    /// entries are delivered first.
    LogsStream {
        #[serde(default)]
        replay: bool,
        #[serde(default)]
        lines: usize,
    },
    /// Askpass helper fetching the password for an alias. The token must
    /// equal the live token issued when the SSH child was spawned.
    Askpass { alias: String, token: String },
}
