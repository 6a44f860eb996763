// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: owns the topology.
//!
//! Wiring: probes → readings queue → forwarder (logs the sensor entry,
//! then submits) → state manager → transitions → effects processor →
//! hooks, env files, state log, and the context → tunnel action plan.
//! Reload swaps the rule engine, effects configuration, tunnel settings
//! and env readings atomically with respect to the reading stream, then
//! forces a re-evaluation.

use crate::effects::{overseer_vars, EffectsConfig, EffectsProcessor};
use crate::env::READINGS_QUEUE;
use crate::logstream::LogStreamer;
use crate::probes::{env_readings, LocalIpProbe, ProbeCtx, PublicIpProbe, TcpProbe};
use crate::secrets::SecretStore;
use crate::sleep::SleepMonitor;
use crate::state::{StateHandle, StateManager};
use crate::storage::StateLog;
use crate::tunnel::{
    AskpassRegistry, CompanionRegistry, SshLauncher, TunnelDeps, TunnelInfo, TunnelManager,
    TunnelSettings,
};
use indexmap::IndexMap;
use overseer_config::{Config, IpFamily};
use overseer_core::{
    Clock, Level, LogEntry, Payload, SensorReading, StateSnapshot, SystemClock,
    TcpPriorityPolicy,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything `Orchestrator::start` needs injected.
pub struct OrchestratorOptions {
    pub config: Config,
    pub streamer: LogStreamer,
    pub launcher: Arc<dyn SshLauncher>,
    pub secrets: Arc<dyn SecretStore>,
    pub state_log: Option<StateLog>,
    /// Path re-invoked as the askpass helper.
    pub helper_exe: PathBuf,
    /// Disable the real network probes (tests drive readings directly).
    pub probes_enabled: bool,
}

pub struct Orchestrator {
    config: Arc<RwLock<Config>>,
    streamer: LogStreamer,
    sleep: SleepMonitor,
    state: StateHandle,
    effects_config: Arc<RwLock<EffectsConfig>>,
    tunnels: Arc<TunnelManager>,
    askpass: AskpassRegistry,
    secrets: Arc<dyn SecretStore>,
    readings_tx: mpsc::Sender<SensorReading>,
    cancel: CancellationToken,
    manager_cancel: CancellationToken,
    forwarder_task: Mutex<Option<JoinHandle<()>>>,
    manager_task: Mutex<Option<JoinHandle<()>>>,
    effects_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub async fn start(opts: OrchestratorOptions) -> Arc<Orchestrator> {
        let OrchestratorOptions {
            config,
            streamer,
            launcher,
            secrets,
            state_log,
            helper_exe,
            probes_enabled,
        } = opts;

        let cancel = CancellationToken::new();
        let manager_cancel = CancellationToken::new();
        let sleep = SleepMonitor::new();
        let askpass = AskpassRegistry::new();
        let clock = SystemClock;

        // State manager.
        let engine = config.engine();
        let policy = Box::new(TcpPriorityPolicy::new(config.probes.tcp_interval));
        let (manager, state, transitions) = StateManager::new(engine.clone(), policy, clock.clone());
        let manager_task = tokio::spawn(manager.run(manager_cancel.clone()));

        // Effects processor.
        let effects_config = Arc::new(RwLock::new(EffectsConfig::from_config(&config)));
        let mut processor = EffectsProcessor::new(
            transitions,
            streamer.clone(),
            Arc::clone(&effects_config),
            state_log,
        );
        let last_ipv4 = processor.last_written_ipv4();

        let config = Arc::new(RwLock::new(config));

        // Tunnel manager, fed by the snapshot-derived ssh environment.
        let tunnels = {
            let state = state.clone();
            let config_for_env = Arc::clone(&config);
            let last_ipv4 = Arc::clone(&last_ipv4);
            let ssh_env = Arc::new(move |_alias: &str| {
                let snapshot = state.snapshot();
                let preferred = config_for_env.read().exports.preferred_ip;
                build_ssh_env(&snapshot, *last_ipv4.lock(), preferred, None)
            });
            let settings = TunnelSettings::from_config(&config.read());
            Arc::new(TunnelManager::new(TunnelDeps {
                launcher,
                streamer: streamer.clone(),
                askpass: askpass.clone(),
                secrets: Arc::clone(&secrets),
                registry: CompanionRegistry::new(),
                settings: RwLock::new(settings),
                ssh_env,
                helper_exe,
            }))
        };

        // Context changes drive the tunnel action plan.
        {
            let config = Arc::clone(&config);
            let tunnels = Arc::clone(&tunnels);
            let streamer_cb = streamer.clone();
            processor.on_context_change(move |transition| {
                let (connect, disconnect) = {
                    let config = config.read();
                    match config.rules.iter().find(|r| r.name == transition.to.matched_rule) {
                        Some(rule) => {
                            (rule.actions.connect.clone(), rule.actions.disconnect.clone())
                        }
                        None => (Vec::new(), Vec::new()),
                    }
                };
                if !connect.is_empty() || !disconnect.is_empty() {
                    streamer_cb.emit(LogEntry::system(
                        Level::Info,
                        "context_actions",
                        format!(
                            "context {} plan: connect [{}] disconnect [{}]",
                            transition.to.context,
                            connect.join(", "),
                            disconnect.join(", ")
                        ),
                    ));
                    tunnels.apply_plan(&connect, &disconnect);
                }
            });
        }
        {
            let streamer_cb = streamer.clone();
            processor.on_online_change(move |online| {
                streamer_cb.emit(LogEntry::system(
                    Level::Info,
                    "online_changed",
                    format!("online: {online}"),
                ));
            });
        }
        let effects_task = tokio::spawn(processor.run());

        // Readings forwarder: log the sensor entry, then submit.
        let (readings_tx, mut readings_rx) = mpsc::channel::<SensorReading>(READINGS_QUEUE);
        let forwarder_task = {
            let state = state.clone();
            let streamer = streamer.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        reading = readings_rx.recv() => match reading {
                            Some(reading) => forward_reading(&streamer, &state, reading),
                            None => break,
                        },
                        _ = cancel.cancelled() => {
                            // Drain whatever the probes managed to queue.
                            while let Ok(reading) = readings_rx.try_recv() {
                                forward_reading(&streamer, &state, reading);
                            }
                            break;
                        }
                    }
                }
                tracing::debug!("readings forwarder stopped");
            })
        };

        let orchestrator = Arc::new(Orchestrator {
            config,
            streamer,
            sleep,
            state,
            effects_config,
            tunnels,
            askpass,
            secrets,
            readings_tx,
            cancel,
            manager_cancel,
            forwarder_task: Mutex::new(Some(forwarder_task)),
            manager_task: Mutex::new(Some(manager_task)),
            effects_task: Mutex::new(Some(effects_task)),
        });

        if probes_enabled {
            orchestrator.spawn_probes();
        }
        orchestrator.submit_env_readings(&engine.env_var_names());

        orchestrator.emit_system("orchestrator_start", "orchestrator started");
        orchestrator
    }

    fn spawn_probes(&self) {
        let probes = self.config.read().probes.clone();
        let ctx = ProbeCtx {
            readings: self.readings_tx.clone(),
            sleep: self.sleep.clone(),
            cancel: self.cancel.clone(),
            clock: SystemClock,
        };

        let tcp = TcpProbe {
            target: probes.tcp_target.clone(),
            interval: probes.tcp_interval,
            timeout: probes.tcp_timeout,
        };
        tokio::spawn(tcp.run(ctx.clone()));

        let ipv4 = PublicIpProbe::ipv4(probes.ipv4_resolver.clone(), probes.ip_interval);
        tokio::spawn(ipv4.run(ctx.clone()));

        let ipv6 = PublicIpProbe::ipv6(probes.ipv6_resolver.clone(), probes.ip_interval);
        tokio::spawn(ipv6.run(ctx.clone()));

        let local = LocalIpProbe::new(probes.ip_interval);
        tokio::spawn(local.run(ctx));
    }

    /// Read the referenced environment variables and feed them through
    /// the forwarder.
    fn submit_env_readings(&self, vars: &std::collections::BTreeSet<String>) {
        let now = SystemClock.epoch_ms();
        for reading in env_readings(vars.iter(), now) {
            if self.readings_tx.try_send(reading).is_err() {
                tracing::warn!("readings queue full, dropping env reading");
            }
        }
    }

    /// Swap in a new configuration atomically and force a re-evaluation.
    pub fn reload(&self, new_config: Config) {
        let engine = new_config.engine();
        let env_vars = engine.env_var_names();

        *self.config.write() = new_config.clone();
        self.state.set_engine(engine);
        *self.effects_config.write() = EffectsConfig::from_config(&new_config);
        self.tunnels.update_settings(TunnelSettings::from_config(&new_config));
        self.submit_env_readings(&env_vars);

        self.emit_system("config_reload", "configuration reloaded");
        self.state.force_check("config_reload");
    }

    /// Reload from disk; a malformed file keeps the prior configuration.
    pub fn reload_from_disk(&self, path: &std::path::Path) -> Result<(), String> {
        match overseer_config::load_file(path) {
            Ok(config) => {
                self.reload(config);
                Ok(())
            }
            Err(e) => {
                self.emit_system_level(
                    Level::Warn,
                    "config_reload_failed",
                    format!("reload failed, keeping prior config: {e}"),
                );
                Err(e.to_string())
            }
        }
    }

    /// Ordered shutdown: probes, forwarder (drained), manager (closes
    /// the transitions stream), effects, tunnels.
    pub async fn stop(&self) {
        self.emit_system("orchestrator_stop", "orchestrator stopping");
        self.cancel.cancel();
        if let Some(task) = self.forwarder_task.lock().take() {
            let _ = task.await;
        }
        self.manager_cancel.cancel();
        if let Some(task) = self.manager_task.lock().take() {
            let _ = task.await;
        }
        if let Some(task) = self.effects_task.lock().take() {
            let _ = task.await;
        }
        self.tunnels.shutdown().await;
    }

    // --- accessors used by the listener and lifecycle ---

    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.state.snapshot()
    }

    pub fn state_handle(&self) -> &StateHandle {
        &self.state
    }

    pub fn streamer(&self) -> &LogStreamer {
        &self.streamer
    }

    pub fn sleep_monitor(&self) -> &SleepMonitor {
        &self.sleep
    }

    pub fn tunnel_infos(&self) -> Vec<TunnelInfo> {
        self.tunnels.infos()
    }

    pub fn connect(&self, alias: &str) {
        self.tunnels.connect(alias);
    }

    pub fn disconnect(&self, alias: Option<&str>) {
        self.tunnels.disconnect(alias);
    }

    pub fn reconnect(&self, alias: &str) {
        self.tunnels.reconnect(alias);
    }

    /// `reset` admin command: clear retry counters and re-evaluate.
    pub fn reset(&self) {
        self.tunnels.reset_retries();
        self.state.force_check("reset");
    }

    pub fn submit_reading(&self, reading: SensorReading) {
        if self.readings_tx.try_send(reading).is_err() {
            tracing::warn!("readings queue full, dropping submitted reading");
        }
    }

    pub fn force_check(&self, reason: &str) {
        self.state.force_check(reason);
    }

    /// Platform network-change events land here.
    pub fn notify_network_change(&self) {
        self.force_check("network_change");
    }

    /// Serve an askpass request: the token must match the live token for
    /// the alias.
    pub fn askpass(&self, alias: &str, token: &str) -> Result<String, String> {
        if !self.askpass.verify(alias, token) {
            self.emit_system_level(
                Level::Warn,
                "askpass_rejected",
                format!("askpass rejected for {alias}: token mismatch"),
            );
            return Err("askpass token mismatch".to_string());
        }
        match self.secrets.lookup(alias) {
            Some(password) => Ok(password),
            None => Err(format!("no stored password for {alias}")),
        }
    }

    fn emit_system(&self, event: &str, message: &str) {
        self.emit_system_level(Level::Info, event, message.to_string());
    }

    fn emit_system_level(&self, level: Level, event: &str, message: String) {
        self.streamer.emit(LogEntry::system(level, event, message));
    }
}

fn forward_reading(streamer: &LogStreamer, state: &StateHandle, reading: SensorReading) {
    streamer.emit(LogEntry::sensor(
        Level::Debug,
        format!("reading from {}", reading.sensor),
        Payload::Sensor {
            sensor: reading.sensor.clone(),
            online: reading.online,
            ip: reading.ip,
            value: reading.value.clone(),
            error: reading.error.clone(),
            latency_ms: reading.latency_ms,
        },
    ));
    state.submit(reading);
}

/// The environment handed to a tunnel's SSH child: `OVERSEER_*` fields
/// present on the snapshot (empty omitted), the context/location merged
/// environment, then user-supplied overrides last. The public IPv4 is
/// replaced by the last value actually written to env files, so a child
/// never sees an address that scripts on disk cannot.
pub fn build_ssh_env(
    snapshot: &StateSnapshot,
    externalised_ipv4: Option<Ipv4Addr>,
    preferred: IpFamily,
    user_env: Option<&IndexMap<String, String>>,
) -> HashMap<String, String> {
    let mut snapshot = snapshot.clone();
    if let Some(ipv4) = externalised_ipv4 {
        snapshot.public_ipv4 = Some(ipv4);
    }

    let mut env: HashMap<String, String> =
        overseer_vars(&snapshot, preferred).into_iter().collect();
    for (key, value) in &snapshot.environment {
        env.insert(key.clone(), value.clone());
    }
    if let Some(user_env) = user_env {
        for (key, value) in user_env {
            env.insert(key.clone(), value.clone());
        }
    }
    env
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
