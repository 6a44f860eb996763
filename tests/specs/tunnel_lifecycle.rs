// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel lifecycle specs: the backoff ladder and give-up behavior.

use overseer_config::ReconnectSettings;
use overseer_daemon::logstream::LogStreamer;
use overseer_daemon::secrets::MemorySecretStore;
use overseer_daemon::tunnel::{
    backoff_delay, AskpassRegistry, CompanionRegistry, FakeLauncher, TunnelDeps, TunnelManager,
    TunnelSettings, TunnelState,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The documented ladder: 1s initial, factor 2, 5m cap.
#[test]
fn backoff_ladder_doubles_to_the_cap() {
    let settings = ReconnectSettings {
        enabled: true,
        initial_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(300),
        backoff_factor: 2.0,
        max_retries: 10,
        connect_window: Duration::from_secs(10),
    };
    let delays: Vec<u64> =
        (0..12).map(|attempt| backoff_delay(&settings, attempt).as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 300, 300, 300]);
}

fn manager(launcher: Arc<FakeLauncher>, max_retries: u32) -> TunnelManager {
    TunnelManager::new(TunnelDeps {
        launcher,
        streamer: LogStreamer::new(256),
        askpass: AskpassRegistry::new(),
        secrets: Arc::new(MemorySecretStore::new()),
        registry: CompanionRegistry::new(),
        settings: RwLock::new(TunnelSettings {
            reconnect: ReconnectSettings {
                enabled: true,
                initial_backoff: Duration::from_millis(20),
                max_backoff: Duration::from_millis(80),
                backoff_factor: 2.0,
                max_retries,
                connect_window: Duration::from_millis(60),
            },
            history_size: 50,
            specs: indexmap::IndexMap::new(),
        }),
        ssh_env: Arc::new(|_| HashMap::new()),
        helper_exe: PathBuf::from("/usr/local/bin/overseer"),
    })
}

async fn wait_for(manager: &TunnelManager, alias: &str, state: TunnelState) -> u32 {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(info) = manager.infos().into_iter().find(|i| i.alias == alias) {
            if info.state == state {
                return info.attempts;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {state:?}; infos: {:?}",
            manager.infos()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// An SSH child that dies inside the connect window walks the backoff
/// ladder and gives up once the retries are spent.
#[tokio::test]
async fn crashing_child_walks_backoff_to_gave_up() {
    let launcher = Arc::new(FakeLauncher::exiting_immediately(255));
    let manager = manager(Arc::clone(&launcher), 3);

    manager.connect("nas");
    wait_for(&manager, "nas", TunnelState::GaveUp).await;

    // One spawn for the initial attempt plus one per retry.
    assert_eq!(launcher.spawns().len(), 4);
    manager.shutdown().await;
}

/// A stable child connects, survives a drop, reconnects, and an
/// explicit disconnect wins over the reconnect logic.
#[tokio::test]
async fn connected_tunnel_disconnects_on_command() {
    let launcher = Arc::new(FakeLauncher::running_forever());
    let manager = manager(Arc::clone(&launcher), 3);

    manager.connect("nas");
    wait_for(&manager, "nas", TunnelState::Connected).await;

    manager.disconnect(Some("nas"));
    wait_for(&manager, "nas", TunnelState::Disconnected).await;

    // No reconnect was attempted after the explicit disconnect.
    assert_eq!(launcher.spawns().len(), 1);
    manager.shutdown().await;
}

/// `reset-retries` moves a gave-up tunnel back to connecting.
#[tokio::test]
async fn reset_retries_reconnects_after_give_up() {
    let launcher = Arc::new(FakeLauncher::exiting_immediately(1));
    let manager = manager(Arc::clone(&launcher), 2);

    manager.connect("nas");
    wait_for(&manager, "nas", TunnelState::GaveUp).await;

    launcher.set_behavior(overseer_daemon::tunnel::FakeBehavior::Run("sleep 86400".into()));
    manager.reset_retries();
    wait_for(&manager, "nas", TunnelState::Connected).await;
    manager.shutdown().await;
}
