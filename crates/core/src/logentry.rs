// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured log entries broadcast by the log streamer.
//!
//! Each entry carries exactly one payload variant, matching its
//! category; the constructors below are the only way entries are built,
//! which keeps that pairing intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sensor,
    State,
    Effect,
    System,
    Hook,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sensor => "sensor",
            Category::State => "state",
            Category::Effect => "effect",
            Category::System => "system",
            Category::Hook => "hook",
        }
    }
}

/// Category-specific payload. One variant per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Sensor {
        sensor: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        online: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip: Option<IpAddr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        latency_ms: Option<u64>,
    },
    State {
        field: String,
        from: String,
        to: String,
    },
    Effect {
        effect: String,
        success: bool,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    System {
        event: String,
    },
    Hook {
        hook_type: String,
        target_type: String,
        target: String,
        command: String,
        success: bool,
        duration_ms: u64,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub category: Category,
    pub message: String,
    pub payload: Payload,
}

impl LogEntry {
    pub fn sensor(level: Level, message: impl Into<String>, payload: Payload) -> Self {
        debug_assert!(matches!(payload, Payload::Sensor { .. }));
        Self::build(level, Category::Sensor, message, payload)
    }

    pub fn state(message: impl Into<String>, field: &str, from: String, to: String) -> Self {
        Self::build(
            Level::Info,
            Category::State,
            message,
            Payload::State { field: field.to_string(), from, to },
        )
    }

    pub fn effect(
        level: Level,
        message: impl Into<String>,
        effect: impl Into<String>,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    ) -> Self {
        Self::build(
            level,
            Category::Effect,
            message,
            Payload::Effect { effect: effect.into(), success, duration_ms, error },
        )
    }

    pub fn system(level: Level, event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(level, Category::System, message, Payload::System { event: event.into() })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn hook(
        level: Level,
        message: impl Into<String>,
        hook_type: &str,
        target_type: &str,
        target: &str,
        command: &str,
        success: bool,
        duration_ms: u64,
        output: String,
        error: Option<String>,
    ) -> Self {
        Self::build(
            level,
            Category::Hook,
            message,
            Payload::Hook {
                hook_type: hook_type.to_string(),
                target_type: target_type.to_string(),
                target: target.to_string(),
                command: command.to_string(),
                success,
                duration_ms,
                output,
                error,
            },
        )
    }

    fn build(level: Level, category: Category, message: impl Into<String>, payload: Payload) -> Self {
        Self { timestamp: Utc::now(), level, category, message: message.into(), payload }
    }
}

#[cfg(test)]
#[path = "logentry_tests.rs"]
mod tests;
