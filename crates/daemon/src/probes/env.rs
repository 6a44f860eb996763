// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable sensors.
//!
//! The process environment is read once at startup and again at config
//! reload; env values never change inside a daemon process, so these are
//! one-shot readings rather than a tick loop.

use overseer_core::sensor::env_sensor;
use overseer_core::SensorReading;

/// One reading per referenced variable. Unset variables produce a
/// reading with no value, which never matches any pattern.
pub fn env_readings<I, S>(vars: I, now_ms: u64) -> Vec<SensorReading>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    vars.into_iter()
        .map(|var| {
            let var = var.as_ref();
            let reading = SensorReading::new(env_sensor(var), now_ms);
            match std::env::var(var) {
                Ok(value) => reading.with_value(value),
                Err(_) => reading,
            }
        })
        .collect()
}
