// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Askpass token brokering.
//!
//! When a password tunnel's SSH child is spawned, a fresh random token
//! is issued for the alias and exported to the child. The child,
//! re-invoked by SSH as the askpass helper, authenticates back over the
//! IPC socket with that token and receives the stored password.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AskpassRegistry {
    tokens: Arc<Mutex<HashMap<String, String>>>,
}

impl AskpassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for an alias, replacing any prior one.
    pub fn issue(&self, alias: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.tokens.lock().insert(alias.to_string(), token.clone());
        token
    }

    /// Whether `token` is the live token for `alias`.
    pub fn verify(&self, alias: &str, token: &str) -> bool {
        self.tokens
            .lock()
            .get(alias)
            .is_some_and(|live| !token.is_empty() && live == token)
    }

    pub fn revoke(&self, alias: &str) {
        self.tokens.lock().remove(alias);
    }
}

/// Environment exported to an SSH child so it can hand the password
/// prompt back to us. A non-empty DISPLAY makes older SSH clients
/// activate askpass at all.
pub fn askpass_env(helper: &Path, alias: &str, token: &str) -> Vec<(String, String)> {
    let display = std::env::var("DISPLAY").ok().filter(|d| !d.is_empty());
    vec![
        ("SSH_ASKPASS".to_string(), helper.display().to_string()),
        ("SSH_ASKPASS_REQUIRE".to_string(), "force".to_string()),
        ("OVERSEER_ASKPASS_ALIAS".to_string(), alias.to_string()),
        ("OVERSEER_ASKPASS_TOKEN".to_string(), token.to_string()),
        ("DISPLAY".to_string(), display.unwrap_or_else(|| ":0".to_string())),
    ]
}

#[cfg(test)]
#[path = "askpass_tests.rs"]
mod tests;
