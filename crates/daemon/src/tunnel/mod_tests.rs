// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::secrets::MemorySecretStore;
use overseer_config::{CompanionSpec, WaitMode};
use std::time::Duration;

fn fast_reconnect() -> ReconnectSettings {
    ReconnectSettings {
        enabled: true,
        initial_backoff: Duration::from_millis(30),
        max_backoff: Duration::from_millis(120),
        backoff_factor: 2.0,
        max_retries: 2,
        connect_window: Duration::from_millis(80),
    }
}

fn settings(specs: IndexMap<String, TunnelSpec>) -> TunnelSettings {
    TunnelSettings { reconnect: fast_reconnect(), history_size: 50, specs }
}

fn manager_with(
    launcher: Arc<FakeLauncher>,
    specs: IndexMap<String, TunnelSpec>,
    secrets: Arc<MemorySecretStore>,
) -> TunnelManager {
    TunnelManager::new(TunnelDeps {
        launcher,
        streamer: LogStreamer::new(256),
        askpass: AskpassRegistry::new(),
        secrets,
        registry: CompanionRegistry::new(),
        settings: RwLock::new(settings(specs)),
        ssh_env: Arc::new(|_| HashMap::new()),
        helper_exe: PathBuf::from("/usr/local/bin/overseer"),
    })
}

fn tunnel_spec(alias: &str, companions: Vec<CompanionSpec>) -> TunnelSpec {
    TunnelSpec {
        alias: alias.into(),
        tags: Vec::new(),
        companions,
        before_connect: Vec::new(),
        after_connect: Vec::new(),
        hook_timeout: Duration::from_secs(5),
    }
}

fn companion(name: &str, command: &str, on_failure: OnFailure) -> CompanionSpec {
    CompanionSpec {
        name: name.into(),
        command: command.into(),
        workdir: None,
        environment: indexmap::IndexMap::new(),
        wait_mode: WaitMode::Completion,
        wait_for: None,
        timeout: Duration::from_secs(5),
        ready_delay: None,
        on_failure,
        keep_alive: false,
        auto_restart: false,
        persistent: false,
        stop_signal: "INT".into(),
    }
}

async fn wait_for_state(manager: &TunnelManager, alias: &str, state: TunnelState) -> TunnelInfo {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(info) = manager.infos().into_iter().find(|i| i.alias == alias) {
            if info.state == state {
                return info;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {alias} to reach {state:?}; infos: {:?}",
            manager.infos()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn connect_reaches_connected_and_disconnects() {
    let launcher = Arc::new(FakeLauncher::running_forever());
    let manager = manager_with(launcher, IndexMap::new(), Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    let info = wait_for_state(&manager, "nas", TunnelState::Connected).await;
    assert!(info.connected_since_ms.is_some());

    manager.disconnect(Some("nas"));
    let info = wait_for_state(&manager, "nas", TunnelState::Disconnected).await;
    assert!(info.connected_since_ms.is_none());
    manager.shutdown().await;
}

#[tokio::test]
async fn immediate_exits_ladder_through_backoff_to_gave_up() {
    let launcher = Arc::new(FakeLauncher::exiting_immediately(255));
    let manager = manager_with(launcher, IndexMap::new(), Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    let info = wait_for_state(&manager, "nas", TunnelState::GaveUp).await;
    assert!(info.last_error.unwrap_or_default().contains("ssh exited during connect"));
    // max_retries retries plus the final give-up increment.
    assert_eq!(info.attempts, 3);
    manager.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_gives_up_without_retrying() {
    let launcher = Arc::new(FakeLauncher::failing_spawn());
    let manager = manager_with(launcher, IndexMap::new(), Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    let info = wait_for_state(&manager, "nas", TunnelState::GaveUp).await;
    assert!(info.last_error.unwrap_or_default().contains("spawn failed"));
    assert_eq!(info.attempts, 0, "no backoff attempts for a spawn error");
    manager.shutdown().await;
}

#[tokio::test]
async fn reset_retries_revives_a_gave_up_tunnel() {
    let launcher = Arc::new(FakeLauncher::exiting_immediately(1));
    let manager =
        manager_with(Arc::clone(&launcher), IndexMap::new(), Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    wait_for_state(&manager, "nas", TunnelState::GaveUp).await;

    launcher.set_behavior(FakeBehavior::Run("sleep 86400".into()));
    manager.reset_retries();
    wait_for_state(&manager, "nas", TunnelState::Connected).await;
    manager.shutdown().await;
}

#[tokio::test]
async fn reconnect_resets_the_attempt_counter() {
    let launcher = Arc::new(FakeLauncher::running_forever());
    let manager = manager_with(launcher, IndexMap::new(), Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    wait_for_state(&manager, "nas", TunnelState::Connected).await;
    manager.reconnect("nas");
    let info = wait_for_state(&manager, "nas", TunnelState::Connected).await;
    assert_eq!(info.attempts, 0);
    manager.shutdown().await;
}

#[tokio::test]
async fn askpass_env_is_exported_for_password_tunnels() {
    let launcher = Arc::new(FakeLauncher::running_forever());
    let secrets = Arc::new(MemorySecretStore::new());
    secrets.insert("nas", "hunter2");
    let manager = manager_with(Arc::clone(&launcher), IndexMap::new(), secrets);

    manager.connect("nas");
    wait_for_state(&manager, "nas", TunnelState::Connected).await;

    let spawns = launcher.spawns();
    let (alias, env) = spawns.last().unwrap();
    assert_eq!(alias, "nas");
    assert_eq!(env.get("SSH_ASKPASS_REQUIRE").map(String::as_str), Some("force"));
    assert_eq!(env.get("OVERSEER_ASKPASS_ALIAS").map(String::as_str), Some("nas"));
    assert!(env.contains_key("SSH_ASKPASS"));
    assert!(!env.get("DISPLAY").unwrap_or(&String::new()).is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn no_askpass_env_without_a_stored_secret() {
    let launcher = Arc::new(FakeLauncher::running_forever());
    let manager =
        manager_with(Arc::clone(&launcher), IndexMap::new(), Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    wait_for_state(&manager, "nas", TunnelState::Connected).await;

    let spawns = launcher.spawns();
    let (_, env) = spawns.last().unwrap();
    assert!(!env.contains_key("SSH_ASKPASS"));
    manager.shutdown().await;
}

#[tokio::test]
async fn blocking_companion_failure_aborts_the_cycle() {
    let launcher = Arc::new(FakeLauncher::running_forever());
    let mut specs = IndexMap::new();
    specs.insert(
        "nas".to_string(),
        tunnel_spec("nas", vec![companion("vpn", "exit 1", OnFailure::Block)]),
    );
    let manager =
        manager_with(Arc::clone(&launcher), specs, Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    let info = wait_for_state(&manager, "nas", TunnelState::GaveUp).await;
    assert!(info.last_error.unwrap_or_default().contains("companion"));
    assert!(launcher.spawns().is_empty(), "ssh must not spawn after a blocking failure");
    manager.shutdown().await;
}

#[tokio::test]
async fn continue_companion_failure_still_connects() {
    let launcher = Arc::new(FakeLauncher::running_forever());
    let mut specs = IndexMap::new();
    specs.insert(
        "nas".to_string(),
        tunnel_spec("nas", vec![companion("optional", "exit 1", OnFailure::Continue)]),
    );
    let manager =
        manager_with(Arc::clone(&launcher), specs, Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    wait_for_state(&manager, "nas", TunnelState::Connected).await;
    assert_eq!(launcher.spawns().len(), 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_tears_everything_down() {
    let launcher = Arc::new(FakeLauncher::running_forever());
    let manager = manager_with(launcher, IndexMap::new(), Arc::new(MemorySecretStore::new()));

    manager.connect("nas");
    wait_for_state(&manager, "nas", TunnelState::Connected).await;
    manager.shutdown().await;
    assert!(manager.infos().is_empty());
}
