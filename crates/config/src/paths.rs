// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Base directory and path expansion.

use std::path::{Path, PathBuf};

/// Fixed file names under the base directory.
#[derive(Debug, Clone)]
pub struct BasePaths {
    pub base: PathBuf,
    pub config: PathBuf,
    pub pid: PathBuf,
    pub socket: PathBuf,
    pub log: PathBuf,
    pub state_log: PathBuf,
    pub sensor_cache: PathBuf,
    pub secrets: PathBuf,
}

impl BasePaths {
    pub fn new(base: PathBuf) -> Self {
        Self {
            config: base.join("config.hcl"),
            pid: base.join("daemon.pid"),
            socket: base.join("daemon.sock"),
            log: base.join("daemon.log"),
            state_log: base.join("state.db"),
            sensor_cache: base.join("cache.json"),
            secrets: base.join("secrets.json"),
            base,
        }
    }
}

/// Default base directory: `~/.config/overseer`.
pub fn base_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("overseer"))
}

/// Expand a leading `~` / `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// `mkdir -p` for the parent of an export target.
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
