// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Password storage behind a trait seam.
//!
//! The daemon only ever asks "is there a password for this alias" (to
//! decide whether to arm askpass) and "give it to me" (serving an
//! authenticated askpass request). A system-keyring implementation can
//! slot in here; the default reads a JSON map under the base directory.
//! Access is serialised by a coarse mutex, matching how rarely askpass
//! requests arrive.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

pub trait SecretStore: Send + Sync {
    fn lookup(&self, alias: &str) -> Option<String>;

    fn has(&self, alias: &str) -> bool {
        self.lookup(alias).is_some()
    }
}

/// `secrets.json`: `{ "<alias>": "<password>", … }`. Re-read on every
/// lookup so edits take effect without a reload.
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }
}

impl SecretStore for FileSecretStore {
    fn lookup(&self, alias: &str) -> Option<String> {
        let _guard = self.lock.lock();
        let content = std::fs::read_to_string(&self.path).ok()?;
        let map: HashMap<String, String> = serde_json::from_str(&content).ok()?;
        map.get(alias).cloned()
    }
}

/// In-memory store for tests and for wiring without any secrets.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, alias: &str, password: &str) {
        self.entries.lock().insert(alias.to_string(), password.to_string());
    }
}

impl SecretStore for MemorySecretStore {
    fn lookup(&self, alias: &str) -> Option<String> {
        self.entries.lock().get(alias).cloned()
    }
}
