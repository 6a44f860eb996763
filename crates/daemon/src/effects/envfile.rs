// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Env-file export writers.
//!
//! Four kinds: the dotenv export (shell-sourcable `export` lines plus an
//! `unset` line for tracked keys that dropped out of the state) and the
//! single-value context/location/public-ip files. All writes are atomic:
//! temp file next to the target, then rename.

use overseer_config::{ensure_parent, IpFamily};
use overseer_core::StateSnapshot;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// The internal variable names the dotenv writer always tracks.
pub const OVERSEER_VAR_NAMES: [&str; 9] = [
    "OVERSEER_CONTEXT",
    "OVERSEER_CONTEXT_DISPLAY_NAME",
    "OVERSEER_LOCATION",
    "OVERSEER_LOCATION_DISPLAY_NAME",
    "OVERSEER_PUBLIC_IP",
    "OVERSEER_PUBLIC_IPV4",
    "OVERSEER_PUBLIC_IPV6",
    "OVERSEER_LOCAL_IP",
    "OVERSEER_LOCAL_IPV4",
];

/// The `OVERSEER_*` variables present on a snapshot; empty values are
/// omitted. `OVERSEER_PUBLIC_IP` follows the preferred family and falls
/// back to the other one.
pub fn overseer_vars(snapshot: &StateSnapshot, preferred: IpFamily) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let mut put = |key: &str, value: String| {
        if !value.is_empty() {
            vars.insert(key.to_string(), value);
        }
    };

    put("OVERSEER_CONTEXT", snapshot.context.clone());
    put("OVERSEER_CONTEXT_DISPLAY_NAME", snapshot.context_display.clone());
    put("OVERSEER_LOCATION", snapshot.location.clone());
    put("OVERSEER_LOCATION_DISPLAY_NAME", snapshot.location_display.clone());

    let v4 = snapshot.public_ipv4.map(|ip| ip.to_string()).unwrap_or_default();
    let v6 = snapshot.public_ipv6.map(|ip| ip.to_string()).unwrap_or_default();
    let public = match preferred {
        IpFamily::V4 if !v4.is_empty() => v4.clone(),
        IpFamily::V4 => v6.clone(),
        IpFamily::V6 if !v6.is_empty() => v6.clone(),
        IpFamily::V6 => v4.clone(),
    };
    put("OVERSEER_PUBLIC_IP", public);
    put("OVERSEER_PUBLIC_IPV4", v4);
    put("OVERSEER_PUBLIC_IPV6", v6);

    let local = snapshot.local_ipv4.map(|ip| ip.to_string()).unwrap_or_default();
    put("OVERSEER_LOCAL_IP", local.clone());
    put("OVERSEER_LOCAL_IPV4", local);

    vars
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterKind {
    Dotenv,
    Context,
    Location,
    PublicIp,
}

impl WriterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriterKind::Dotenv => "dotenv",
            WriterKind::Context => "context",
            WriterKind::Location => "location",
            WriterKind::PublicIp => "public_ip",
        }
    }
}

#[derive(Debug)]
pub struct EnvFileWriter {
    kind: WriterKind,
    path: PathBuf,
    /// Dotenv only: every key ever written plus the fixed internal set.
    tracked: BTreeSet<String>,
}

impl EnvFileWriter {
    pub fn new(kind: WriterKind, path: PathBuf) -> Self {
        let tracked = match kind {
            WriterKind::Dotenv => {
                OVERSEER_VAR_NAMES.iter().map(|s| s.to_string()).collect()
            }
            _ => BTreeSet::new(),
        };
        Self { kind, path, tracked }
    }

    pub fn kind(&self) -> WriterKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render and atomically replace the target file.
    pub fn write(
        &mut self,
        snapshot: &StateSnapshot,
        preferred: IpFamily,
    ) -> std::io::Result<()> {
        let content = match self.kind {
            WriterKind::Dotenv => self.render_dotenv(snapshot, preferred),
            WriterKind::Context => format!("{}\n", snapshot.context),
            WriterKind::Location => format!("{}\n", snapshot.location),
            WriterKind::PublicIp => {
                let vars = overseer_vars(snapshot, preferred);
                format!("{}\n", vars.get("OVERSEER_PUBLIC_IP").cloned().unwrap_or_default())
            }
        };
        atomic_write(&self.path, &content)
    }

    fn render_dotenv(&mut self, snapshot: &StateSnapshot, preferred: IpFamily) -> String {
        let mut union = overseer_vars(snapshot, preferred);
        for (key, value) in &snapshot.environment {
            union.insert(key.clone(), value.clone());
        }

        let unset: Vec<&str> = self
            .tracked
            .iter()
            .filter(|key| !union.contains_key(*key))
            .map(String::as_str)
            .collect();

        let mut out = String::new();
        if !unset.is_empty() {
            out.push_str("# Unset variables not present in the current state\n");
            out.push_str(&format!("unset {}\n", unset.join(" ")));
        }
        for (key, value) in &union {
            out.push_str(&format!("export {key}=\"{}\"\n", shell_escape(value)));
        }

        self.tracked.extend(union.into_keys());
        out
    }
}

/// Write to `<path>.tmp`, then rename over the target.
pub fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    ensure_parent(path)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

/// Escape a value for a double-quoted shell string.
fn shell_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' | '`' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "envfile_tests.rs"]
mod tests;
