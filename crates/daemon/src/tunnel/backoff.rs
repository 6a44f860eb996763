// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect backoff arithmetic.

use overseer_config::ReconnectSettings;
use std::time::Duration;

/// Delay before retry number `attempt` (0-based):
/// `min(max_backoff, initial_backoff * backoff_factor^attempt)`.
pub fn backoff_delay(settings: &ReconnectSettings, attempt: u32) -> Duration {
    let exponent = attempt.min(64) as i32;
    let raw = settings.initial_backoff.as_secs_f64() * settings.backoff_factor.powi(exponent);
    let capped = raw.min(settings.max_backoff.as_secs_f64());
    Duration::from_secs_f64(capped.max(0.0))
}
