// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue capacities and fixed daemon-wide timing constants.

use std::time::Duration;

/// Sensor readings queue between probes and the state manager.
pub const READINGS_QUEUE: usize = 256;

/// Transitions queue between the state manager and the effects
/// processor.
pub const TRANSITIONS_QUEUE: usize = 64;

/// Per-subscriber log delivery queue.
pub const LOG_SUBSCRIBER_QUEUE: usize = 64;

/// Per-tunnel command queue.
pub const TUNNEL_COMMAND_QUEUE: usize = 16;

/// How long children get between the stop signal and SIGKILL.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Post-wake window during which probing stays suppressed.
pub const WAKE_GRACE: Duration = Duration::from_secs(10);

/// Dark-wake window after a wake reported with the user not yet active.
pub const DARK_WAKE_WINDOW: Duration = Duration::from_secs(2);
