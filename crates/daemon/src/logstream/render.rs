// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable rendering of log entries.

use overseer_core::{Level, LogEntry, Payload};

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";

/// Render one entry as a single line, optionally ANSI-coloured.
pub fn render(entry: &LogEntry, color: bool) -> String {
    let time = entry.timestamp.format("%H:%M:%S");
    let level = entry.level.as_str();
    let category = entry.category.as_str();
    let detail = detail(entry);

    if !color {
        return match detail {
            Some(detail) => format!("{time} {level:5} {category:6} {}  {detail}", entry.message),
            None => format!("{time} {level:5} {category:6} {}", entry.message),
        };
    }

    let level_color = match entry.level {
        Level::Debug => DIM,
        Level::Info => GREEN,
        Level::Warn => YELLOW,
        Level::Error => RED,
    };
    match detail {
        Some(detail) => format!(
            "{DIM}{time}{RESET} {level_color}{level:5}{RESET} {CYAN}{category:6}{RESET} {}  {DIM}{detail}{RESET}",
            entry.message
        ),
        None => format!(
            "{DIM}{time}{RESET} {level_color}{level:5}{RESET} {CYAN}{category:6}{RESET} {}",
            entry.message
        ),
    }
}

fn detail(entry: &LogEntry) -> Option<String> {
    match &entry.payload {
        Payload::Sensor { sensor, online, ip, value, error, latency_ms } => {
            let mut parts = vec![format!("sensor={sensor}")];
            if let Some(online) = online {
                parts.push(format!("online={online}"));
            }
            if let Some(ip) = ip {
                parts.push(format!("ip={ip}"));
            }
            if let Some(value) = value {
                parts.push(format!("value={value}"));
            }
            if let Some(latency) = latency_ms {
                parts.push(format!("latency={latency}ms"));
            }
            if let Some(error) = error {
                parts.push(format!("error={error}"));
            }
            Some(parts.join(" "))
        }
        Payload::State { field, from, to } => Some(format!("{field}: {from:?} -> {to:?}")),
        Payload::Effect { effect, success, duration_ms, error } => {
            let mut s = format!("effect={effect} ok={success} took={duration_ms}ms");
            if let Some(error) = error {
                s.push_str(&format!(" error={error}"));
            }
            Some(s)
        }
        Payload::System { event } => Some(format!("event={event}")),
        Payload::Hook { hook_type, target_type, target, success, duration_ms, error, .. } => {
            let mut s = format!(
                "{hook_type}-hook {target_type}={target} ok={success} took={duration_ms}ms"
            );
            if let Some(error) = error {
                s.push_str(&format!(" error={error}"));
            }
            Some(s)
        }
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
