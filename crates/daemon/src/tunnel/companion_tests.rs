// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use overseer_config::OnFailure;
use std::time::Duration;

fn spec(name: &str, command: &str) -> CompanionSpec {
    CompanionSpec {
        name: name.into(),
        command: command.into(),
        workdir: None,
        environment: indexmap::IndexMap::new(),
        wait_mode: WaitMode::Completion,
        wait_for: None,
        timeout: Duration::from_secs(5),
        ready_delay: None,
        on_failure: OnFailure::Block,
        keep_alive: false,
        auto_restart: false,
        persistent: false,
        stop_signal: "INT".into(),
    }
}

fn no_env() -> HashMap<String, String> {
    HashMap::new()
}

#[tokio::test]
async fn completion_mode_waits_for_successful_exit() {
    let proc = start_companion(&spec("setup", "true"), &no_env(), 50).await.unwrap();
    assert!(!proc.is_running(), "completion-mode companion has finished");
}

#[tokio::test]
async fn completion_mode_rejects_nonzero_exit() {
    let err = start_companion(&spec("setup", "exit 7"), &no_env(), 50).await.unwrap_err();
    assert!(matches!(err, CompanionError::StartupExit(7)));
}

#[tokio::test]
async fn completion_mode_times_out() {
    let mut s = spec("slow", "sleep 30");
    s.timeout = Duration::from_millis(100);
    let err = start_companion(&s, &no_env(), 50).await.unwrap_err();
    assert!(matches!(err, CompanionError::WaitTimeout));
}

#[tokio::test]
async fn string_mode_proceeds_on_marker() {
    let mut s = spec("proxy", "echo starting; echo Authenticated; sleep 30");
    s.wait_mode = WaitMode::String;
    s.wait_for = Some("Authenticated".into());

    let proc = start_companion(&s, &no_env(), 50).await.unwrap();
    assert!(proc.is_running(), "string-mode companion keeps running");
    let history = proc.history();
    assert!(history.iter().any(|l| l.contains("starting")));
    proc.stop().await;
}

#[tokio::test]
async fn string_mode_sees_the_marker_on_stderr_too() {
    let mut s = spec("proxy", "echo ready 1>&2; sleep 30");
    s.wait_mode = WaitMode::String;
    s.wait_for = Some("ready".into());

    let proc = start_companion(&s, &no_env(), 50).await.unwrap();
    assert!(proc.is_running());
    proc.stop().await;
}

#[tokio::test]
async fn string_mode_detects_early_exit() {
    let mut s = spec("proxy", "echo nope");
    s.wait_mode = WaitMode::String;
    s.wait_for = Some("Authenticated".into());

    let err = start_companion(&s, &no_env(), 50).await.unwrap_err();
    assert!(matches!(err, CompanionError::ExitedBeforeReady));
}

#[tokio::test]
async fn stop_terminates_the_process_group() {
    let mut s = spec("svc", "sleep 600");
    s.wait_mode = WaitMode::String;
    s.wait_for = Some("never".into());
    // Use a marker that appears immediately instead; keep it simple.
    s.command = "echo up; sleep 600".into();
    s.wait_for = Some("up".into());

    let proc = start_companion(&s, &no_env(), 50).await.unwrap();
    assert!(proc.is_running());
    proc.stop().await;
}

#[tokio::test]
async fn ready_delay_is_applied() {
    let mut s = spec("setup", "true");
    s.ready_delay = Some(Duration::from_millis(50));
    let started = std::time::Instant::now();
    let _ = start_companion(&s, &no_env(), 50).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn auto_restart_respawns_after_exit() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("count");
    let mut s = spec(
        "flaky",
        &format!("echo up; echo x >> {}; sleep 0.1", counter.display()),
    );
    s.wait_mode = WaitMode::String;
    s.wait_for = Some("up".into());
    s.auto_restart = true;

    let proc = start_companion(&s, &no_env(), 50).await.unwrap();
    // Give it time to exit and restart at least once.
    tokio::time::sleep(Duration::from_millis(600)).await;
    proc.stop().await;

    let restarts = std::fs::read_to_string(&counter).unwrap_or_default().lines().count();
    assert!(restarts >= 2, "expected at least one respawn, saw {restarts} runs");
}

#[tokio::test]
async fn registry_stores_and_returns_persistent_companions() {
    let mut s = spec("svc", "echo up; sleep 600");
    s.wait_mode = WaitMode::String;
    s.wait_for = Some("up".into());
    s.persistent = true;

    let proc = start_companion(&s, &no_env(), 50).await.unwrap();
    let registry = CompanionRegistry::new();
    registry.store("nas", proc);

    let adopted = registry.take("nas", "svc").unwrap();
    assert!(adopted.is_running(), "companion survived the registry hand-off");
    assert!(registry.take("nas", "svc").is_none());
    adopted.stop().await;
}

#[tokio::test]
async fn registry_stop_all_drains() {
    let mut s = spec("svc", "echo up; sleep 600");
    s.wait_mode = WaitMode::String;
    s.wait_for = Some("up".into());

    let registry = CompanionRegistry::new();
    registry.store("nas", start_companion(&s, &no_env(), 50).await.unwrap());
    registry.stop_all().await;
    assert!(registry.take("nas", "svc").is_none());
}

#[test]
fn signal_names_parse_with_int_fallback() {
    assert_eq!(parse_signal("TERM"), Signal::SIGTERM);
    assert_eq!(parse_signal("KILL"), Signal::SIGKILL);
    assert_eq!(parse_signal("bogus"), Signal::SIGINT);
}
