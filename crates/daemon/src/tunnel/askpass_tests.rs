// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

#[test]
fn issued_token_verifies_once_per_alias() {
    let registry = AskpassRegistry::new();
    let token = registry.issue("nas");

    assert!(registry.verify("nas", &token));
    assert!(!registry.verify("nas", "wrong"));
    assert!(!registry.verify("other", &token));
}

#[test]
fn reissue_invalidates_the_previous_token() {
    let registry = AskpassRegistry::new();
    let first = registry.issue("nas");
    let second = registry.issue("nas");
    assert_ne!(first, second);
    assert!(!registry.verify("nas", &first));
    assert!(registry.verify("nas", &second));
}

#[test]
fn revoked_alias_verifies_nothing() {
    let registry = AskpassRegistry::new();
    let token = registry.issue("nas");
    registry.revoke("nas");
    assert!(!registry.verify("nas", &token));
}

#[test]
fn empty_token_never_verifies() {
    let registry = AskpassRegistry::new();
    registry.issue("nas");
    assert!(!registry.verify("nas", ""));
}

#[test]
fn tokens_are_unpredictable_enough_to_differ() {
    let registry = AskpassRegistry::new();
    let a = registry.issue("a");
    let b = registry.issue("b");
    assert_ne!(a, b);
    assert!(a.len() >= 32);
}

#[test]
fn askpass_env_exports_the_contract() {
    let env = askpass_env(&PathBuf::from("/usr/bin/overseer"), "nas", "t0k3n");
    let get = |key: &str| {
        env.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };
    assert_eq!(get("SSH_ASKPASS"), "/usr/bin/overseer");
    assert_eq!(get("SSH_ASKPASS_REQUIRE"), "force");
    assert_eq!(get("OVERSEER_ASKPASS_ALIAS"), "nas");
    assert_eq!(get("OVERSEER_ASKPASS_TOKEN"), "t0k3n");
    assert!(!get("DISPLAY").is_empty(), "DISPLAY must be non-empty for older ssh");
}
