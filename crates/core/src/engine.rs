// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The rule engine: sensor cache + computed online → (location, context).
//!
//! Location is selected first (offline-first priority while offline),
//! then the first matching context rule wins. Declaration order is
//! evaluation order throughout.

use crate::condition::Condition;
use crate::rules::{Location, Rule};
use crate::sensor::SensorCache;
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Context name reported when no rule matches.
pub const CONTEXT_UNKNOWN: &str = "unknown";
/// Matched-rule name reported when no rule matches.
pub const RULE_NONE: &str = "none";

/// Outcome of one rule-engine evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    pub context: String,
    pub context_display: String,
    pub location: String,
    pub location_display: String,
    pub matched_rule: String,
    /// Merged environment: global < location < context.
    pub environment: IndexMap<String, String>,
}

/// Ordered rules and locations plus the global environment.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    locations: Vec<Location>,
    global_env: IndexMap<String, String>,
}

impl RuleEngine {
    pub fn new(
        rules: Vec<Rule>,
        locations: Vec<Location>,
        global_env: IndexMap<String, String>,
    ) -> Self {
        Self { rules, locations, global_env }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Look up a location by name.
    pub fn location(&self, name: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.name == name)
    }

    /// Look up a context rule by name.
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn evaluate(&self, cache: &SensorCache, online: bool) -> RuleResult {
        let location = self.select_location(cache, online);
        let (rule, context, context_display, matched_rule) = match self.select_rule(
            cache,
            online,
            location.map(|l| l.name.as_str()),
        ) {
            Some(rule) => (
                Some(rule),
                rule.name.clone(),
                rule.display().to_string(),
                rule.name.clone(),
            ),
            None => (
                None,
                CONTEXT_UNKNOWN.to_string(),
                CONTEXT_UNKNOWN.to_string(),
                RULE_NONE.to_string(),
            ),
        };

        let mut environment = self.global_env.clone();
        if let Some(location) = location {
            environment.extend(location.environment.clone());
        }
        if let Some(rule) = rule {
            environment.extend(rule.environment.clone());
        }

        RuleResult {
            context,
            context_display,
            location: location.map(|l| l.name.clone()).unwrap_or_default(),
            location_display: location.map(|l| l.display().to_string()).unwrap_or_default(),
            matched_rule,
            environment,
        }
    }

    /// First matching location. While offline, a location whose condition
    /// is exactly `online == false` takes priority over other matches.
    fn select_location(&self, cache: &SensorCache, online: bool) -> Option<&Location> {
        if !online {
            let offline_first = self.locations.iter().find(|l| {
                l.condition.as_ref().is_some_and(|c| c.is_offline_check())
            });
            if let Some(location) = offline_first {
                return Some(location);
            }
        }
        self.locations.iter().find(|l| {
            l.condition.as_ref().is_some_and(|c| c.evaluate(cache, online))
        })
    }

    /// First rule that matches by condition, by the selected location, or
    /// unconditionally.
    fn select_rule(
        &self,
        cache: &SensorCache,
        online: bool,
        location: Option<&str>,
    ) -> Option<&Rule> {
        self.rules.iter().find(|rule| {
            if let Some(condition) = &rule.condition {
                if condition.evaluate(cache, online) {
                    return true;
                }
            }
            if let Some(location) = location {
                if rule.locations.iter().any(|l| l == location) {
                    return true;
                }
            }
            rule.is_fallback()
        })
    }

    /// Environment-variable names referenced by any condition. The
    /// orchestrator provisions one env probe per name.
    pub fn env_var_names(&self) -> BTreeSet<String> {
        self.required_sensors()
            .into_iter()
            .filter_map(|s| s.strip_prefix("env:").map(str::to_string))
            .collect()
    }

    /// Union of sensor names referenced by any rule or location
    /// condition.
    pub fn required_sensors(&self) -> BTreeSet<String> {
        let conditions = self
            .rules
            .iter()
            .filter_map(|r| r.condition.as_ref())
            .chain(self.locations.iter().filter_map(|l| l.condition.as_ref()));

        let mut out = BTreeSet::new();
        for condition in conditions {
            out.extend(condition.required_sensors());
        }
        out
    }
}

/// OR a pattern list over one sensor, the shape the legacy simple
/// condition map produces.
pub fn or_of_matches(sensor: &str, patterns: &[String]) -> Condition {
    Condition::Any(
        patterns
            .iter()
            .map(|p| Condition::Match { sensor: sensor.to_string(), pattern: p.clone() })
            .collect(),
    )
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
