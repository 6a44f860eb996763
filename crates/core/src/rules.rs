// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule and location definitions consumed by the rule engine.
//!
//! These are the already-converted forms: the configuration layer folds
//! both condition grammars (legacy simple maps and structured
//! `any`/`all` groups) into a single `Condition` tree before anything
//! reaches this crate.

use crate::condition::Condition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-hook timeout.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Enter/leave shell hooks for a rule, location, or the global scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default)]
    pub on_enter: Vec<String>,
    #[serde(default)]
    pub on_leave: Vec<String>,
    /// Per-hook timeout; each command gets the full window.
    #[serde(default = "default_hook_timeout", with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for Hooks {
    fn default() -> Self {
        Self { on_enter: Vec::new(), on_leave: Vec::new(), timeout: DEFAULT_HOOK_TIMEOUT }
    }
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.on_enter.is_empty() && self.on_leave.is_empty()
    }
}

fn default_hook_timeout() -> Duration {
    DEFAULT_HOOK_TIMEOUT
}

/// Tunnel aliases a context wants connected or disconnected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actions {
    #[serde(default)]
    pub connect: Vec<String>,
    #[serde(default)]
    pub disconnect: Vec<String>,
}

/// A context rule. Matches by condition, by selected location, or
/// unconditionally when it has neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Explicit location names this context applies to.
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub actions: Actions,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub hooks: Hooks,
}

impl Rule {
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Unconditional fallback: no condition and no location list.
    pub fn is_fallback(&self) -> bool {
        self.condition.is_none() && self.locations.is_empty()
    }
}

/// A named physical/network site recognised by its sensor conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub hooks: Hooks,
}

impl Location {
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
