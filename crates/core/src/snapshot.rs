// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative state snapshots and the transitions between them.

use crate::engine::RuleResult;
use crate::policy::OnlineVerdict;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// The derived (online, location, context, addresses) tuple at a point
/// in time. Immutable once built; shared as `Arc`.
///
/// While online, address fields that no sensor could resolve hold the
/// all-zero sentinel (`0.0.0.0` / `::`) so "online but unknown address"
/// stays distinguishable from offline, where the fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub timestamp_ms: u64,
    pub online: bool,
    pub online_source: String,
    pub public_ipv4: Option<Ipv4Addr>,
    pub public_ipv6: Option<Ipv6Addr>,
    pub local_ipv4: Option<Ipv4Addr>,
    pub context: String,
    pub context_display: String,
    pub location: String,
    pub location_display: String,
    pub matched_rule: String,
    /// Merged environment (global < location < context).
    pub environment: IndexMap<String, String>,
}

impl StateSnapshot {
    /// Build a snapshot from a policy verdict and rule result, applying
    /// the zero sentinels while online.
    pub fn build(
        timestamp_ms: u64,
        verdict: &OnlineVerdict,
        result: &RuleResult,
        public_ipv4: Option<Ipv4Addr>,
        public_ipv6: Option<Ipv6Addr>,
        local_ipv4: Option<Ipv4Addr>,
    ) -> Self {
        let (public_ipv4, public_ipv6, local_ipv4) = if verdict.online {
            (
                Some(public_ipv4.unwrap_or(Ipv4Addr::UNSPECIFIED)),
                Some(public_ipv6.unwrap_or(Ipv6Addr::UNSPECIFIED)),
                Some(local_ipv4.unwrap_or(Ipv4Addr::UNSPECIFIED)),
            )
        } else {
            (public_ipv4, public_ipv6, local_ipv4)
        };

        Self {
            timestamp_ms,
            online: verdict.online,
            online_source: verdict.source.clone(),
            public_ipv4,
            public_ipv6,
            local_ipv4,
            context: result.context.clone(),
            context_display: result.context_display.clone(),
            location: result.location.clone(),
            location_display: result.location_display.clone(),
            matched_rule: result.matched_rule.clone(),
            environment: result.environment.clone(),
        }
    }

    /// Fields differing between two snapshots, in the fixed field order.
    pub fn diff(&self, other: &StateSnapshot) -> Vec<ChangedField> {
        let mut changed = Vec::new();
        if self.online != other.online {
            changed.push(ChangedField::Online);
        }
        if self.context != other.context {
            changed.push(ChangedField::Context);
        }
        if self.location != other.location {
            changed.push(ChangedField::Location);
        }
        if self.public_ipv4 != other.public_ipv4 {
            changed.push(ChangedField::Ipv4);
        }
        if self.public_ipv6 != other.public_ipv6 {
            changed.push(ChangedField::Ipv6);
        }
        if self.local_ipv4 != other.local_ipv4 {
            changed.push(ChangedField::LocalIpv4);
        }
        changed
    }

    /// Render one diffable field for log output. Absent values render
    /// empty.
    pub fn field_value(&self, field: ChangedField) -> String {
        match field {
            ChangedField::Online => self.online.to_string(),
            ChangedField::Context => self.context.clone(),
            ChangedField::Location => self.location.clone(),
            ChangedField::Ipv4 => {
                self.public_ipv4.map(|ip| ip.to_string()).unwrap_or_default()
            }
            ChangedField::Ipv6 => {
                self.public_ipv6.map(|ip| ip.to_string()).unwrap_or_default()
            }
            ChangedField::LocalIpv4 => {
                self.local_ipv4.map(|ip| ip.to_string()).unwrap_or_default()
            }
        }
    }
}

/// The six diffable snapshot fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    Online,
    Context,
    Location,
    Ipv4,
    Ipv6,
    LocalIpv4,
}

impl ChangedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangedField::Online => "online",
            ChangedField::Context => "context",
            ChangedField::Location => "location",
            ChangedField::Ipv4 => "ipv4",
            ChangedField::Ipv6 => "ipv6",
            ChangedField::LocalIpv4 => "local_ipv4",
        }
    }
}

impl std::fmt::Display for ChangedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An emitted state change. `changed` is never empty on the transitions
/// stream.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: Arc<StateSnapshot>,
    pub to: Arc<StateSnapshot>,
    /// Sensor name whose reading triggered the transition.
    pub trigger: String,
    pub changed: Vec<ChangedField>,
}

impl StateTransition {
    pub fn changed_contains(&self, field: ChangedField) -> bool {
        self.changed.contains(&field)
    }

    pub fn context_changed(&self) -> bool {
        self.changed_contains(ChangedField::Context)
    }

    pub fn location_changed(&self) -> bool {
        self.changed_contains(ChangedField::Location)
    }

    pub fn online_changed(&self) -> bool {
        self.changed_contains(ChangedField::Online)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
