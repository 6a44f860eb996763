// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunnel supervision.
//!
//! Each tunnel has exactly one owner task driving its state machine:
//!
//! Disconnected → Connecting → Connected → Backoff → … → GaveUp
//!
//! Commands arrive over a per-tunnel FIFO channel and are served in
//! order; no supervisor ever touches another tunnel's state. A spawn
//! error gives up outright; an SSH exit inside the connect window is the
//! retryable failure that feeds the backoff ladder. The attempt counter
//! survives `Connected` ("retries remaining" means remaining for the
//! tunnel, not per session) and resets on
//! explicit connect/reconnect commands and the reset-retries admin
//! command.

mod askpass;
mod backoff;
mod companion;
mod launcher;

pub use askpass::{askpass_env, AskpassRegistry};
pub use backoff::backoff_delay;
pub use companion::{
    start_companion, stop_process, CompanionError, CompanionProc, CompanionRegistry,
};
#[cfg(any(test, feature = "test-support"))]
pub use launcher::{FakeBehavior, FakeLauncher};
pub use launcher::{SshCommandLauncher, SshLauncher};

use crate::env::{SHUTDOWN_GRACE, TUNNEL_COMMAND_QUEUE};
use crate::hooks::{run_hook, HookOutcome};
use crate::logstream::LogStreamer;
use crate::secrets::SecretStore;
use indexmap::IndexMap;
use overseer_config::{Config, OnFailure, ReconnectSettings, TunnelSpec};
use overseer_core::{Clock, Level, LogEntry, SystemClock};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelCommand {
    Connect,
    Disconnect,
    Reconnect,
    ResetRetries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
    GaveUp,
}

impl TunnelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelState::Disconnected => "disconnected",
            TunnelState::Connecting => "connecting",
            TunnelState::Connected => "connected",
            TunnelState::Backoff => "backoff",
            TunnelState::GaveUp => "gave_up",
        }
    }
}

/// Externally visible per-tunnel state.
#[derive(Debug, Clone)]
pub struct TunnelInfo {
    pub alias: String,
    pub state: TunnelState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub connected_since_ms: Option<u64>,
    pub next_attempt_ms: Option<u64>,
}

impl TunnelInfo {
    fn new(alias: String) -> Self {
        Self {
            alias,
            state: TunnelState::Disconnected,
            attempts: 0,
            last_error: None,
            connected_since_ms: None,
            next_attempt_ms: None,
        }
    }
}

/// Reload-swappable tunnel configuration.
pub struct TunnelSettings {
    pub reconnect: ReconnectSettings,
    pub history_size: usize,
    pub specs: IndexMap<String, TunnelSpec>,
}

impl TunnelSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reconnect: config.ssh.reconnect.clone(),
            history_size: config.companions.history_size,
            specs: config.tunnels.clone(),
        }
    }
}

pub type SshEnvProvider = Arc<dyn Fn(&str) -> HashMap<String, String> + Send + Sync>;

/// Shared collaborators for every supervisor.
pub struct TunnelDeps {
    pub launcher: Arc<dyn SshLauncher>,
    pub streamer: LogStreamer,
    pub askpass: AskpassRegistry,
    pub secrets: Arc<dyn SecretStore>,
    pub registry: CompanionRegistry,
    pub settings: RwLock<TunnelSettings>,
    /// Builds the environment for a tunnel's SSH child (snapshot
    /// `OVERSEER_*` vars plus merged env).
    pub ssh_env: SshEnvProvider,
    /// Path re-invoked by SSH as the askpass helper.
    pub helper_exe: PathBuf,
}

/// Registry of running supervisors, one owner task per tunnel.
pub struct TunnelManager {
    deps: Arc<TunnelDeps>,
    tunnels: Mutex<HashMap<String, TunnelHandle>>,
}

struct TunnelHandle {
    commands: mpsc::Sender<TunnelCommand>,
    info: Arc<Mutex<TunnelInfo>>,
    task: JoinHandle<()>,
}

impl TunnelManager {
    pub fn new(deps: TunnelDeps) -> Self {
        Self { deps: Arc::new(deps), tunnels: Mutex::new(HashMap::new()) }
    }

    pub fn connect(&self, alias: &str) {
        self.send(alias, TunnelCommand::Connect, true);
    }

    /// Disconnect one tunnel, or every known tunnel when no alias is
    /// given.
    pub fn disconnect(&self, alias: Option<&str>) {
        match alias {
            Some(alias) => self.send(alias, TunnelCommand::Disconnect, false),
            None => {
                let aliases: Vec<String> = self.tunnels.lock().keys().cloned().collect();
                for alias in aliases {
                    self.send(&alias, TunnelCommand::Disconnect, false);
                }
            }
        }
    }

    pub fn reconnect(&self, alias: &str) {
        self.send(alias, TunnelCommand::Reconnect, true);
    }

    /// Reset retry counters everywhere; tunnels that gave up start
    /// connecting again.
    pub fn reset_retries(&self) {
        let aliases: Vec<String> = self.tunnels.lock().keys().cloned().collect();
        for alias in aliases {
            self.send(&alias, TunnelCommand::ResetRetries, false);
        }
    }

    /// Apply a context action plan: disconnects first, then connects.
    pub fn apply_plan(&self, connect: &[String], disconnect: &[String]) {
        for alias in disconnect {
            self.send(alias, TunnelCommand::Disconnect, false);
        }
        for alias in connect {
            self.send(alias, TunnelCommand::Connect, true);
        }
    }

    pub fn update_settings(&self, settings: TunnelSettings) {
        *self.deps.settings.write() = settings;
    }

    pub fn infos(&self) -> Vec<TunnelInfo> {
        let mut infos: Vec<TunnelInfo> =
            self.tunnels.lock().values().map(|h| h.info.lock().clone()).collect();
        infos.sort_by(|a, b| a.alias.cmp(&b.alias));
        infos
    }

    /// Close every command channel and wait for the supervisors to tear
    /// down their children.
    pub async fn shutdown(&self) {
        let handles: Vec<TunnelHandle> = {
            let mut tunnels = self.tunnels.lock();
            tunnels.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            drop(handle.commands);
            let _ = handle.task.await;
        }
        self.deps.registry.stop_all().await;
    }

    fn send(&self, alias: &str, command: TunnelCommand, create: bool) {
        let mut tunnels = self.tunnels.lock();
        if !tunnels.contains_key(alias) {
            if !create {
                return;
            }
            let handle = self.spawn_supervisor(alias);
            tunnels.insert(alias.to_string(), handle);
        }
        if let Some(handle) = tunnels.get(alias) {
            if handle.commands.try_send(command).is_err() {
                tracing::warn!(alias, ?command, "tunnel command queue full, dropping command");
            }
        }
    }

    fn spawn_supervisor(&self, alias: &str) -> TunnelHandle {
        let (tx, rx) = mpsc::channel(TUNNEL_COMMAND_QUEUE);
        let info = Arc::new(Mutex::new(TunnelInfo::new(alias.to_string())));
        let supervisor = Supervisor {
            alias: alias.to_string(),
            commands: rx,
            deps: Arc::clone(&self.deps),
            info: Arc::clone(&info),
            state: TunnelState::Disconnected,
            attempts: 0,
            child: None,
            companions: Vec::new(),
            clock: SystemClock,
            stopping: false,
        };
        let task = tokio::spawn(supervisor.run());
        TunnelHandle { commands: tx, info, task }
    }
}

enum ChildEvent {
    Exited(std::io::Result<std::process::ExitStatus>),
    Command(Option<TunnelCommand>),
}

enum WindowEvent {
    Settled,
    Exited(std::io::Result<std::process::ExitStatus>),
    Command(Option<TunnelCommand>),
}

struct Supervisor {
    alias: String,
    commands: mpsc::Receiver<TunnelCommand>,
    deps: Arc<TunnelDeps>,
    info: Arc<Mutex<TunnelInfo>>,
    state: TunnelState,
    attempts: u32,
    child: Option<Child>,
    companions: Vec<CompanionProc>,
    clock: SystemClock,
    stopping: bool,
}

impl Supervisor {
    async fn run(mut self) {
        while !self.stopping {
            match self.state {
                TunnelState::Disconnected | TunnelState::GaveUp => {
                    match self.commands.recv().await {
                        Some(command) => self.handle_idle(command),
                        None => break,
                    }
                }
                TunnelState::Connecting => self.connect_cycle().await,
                TunnelState::Connected => self.watch_child().await,
                TunnelState::Backoff => self.backoff_wait().await,
            }
        }
        self.teardown().await;
    }

    fn handle_idle(&mut self, command: TunnelCommand) {
        match command {
            TunnelCommand::Connect | TunnelCommand::Reconnect => {
                self.attempts = 0;
                self.set_state(TunnelState::Connecting);
            }
            TunnelCommand::ResetRetries => {
                self.attempts = 0;
                if self.state == TunnelState::GaveUp {
                    self.set_state(TunnelState::Connecting);
                } else {
                    self.info.lock().attempts = 0;
                }
            }
            TunnelCommand::Disconnect => {}
        }
    }

    async fn connect_cycle(&mut self) {
        let (spec, reconnect, history_size) = {
            let settings = self.deps.settings.read();
            (
                settings.specs.get(&self.alias).cloned(),
                settings.reconnect.clone(),
                settings.history_size,
            )
        };
        self.emit(Level::Info, "tunnel_connecting", format!("tunnel {} connecting", self.alias));

        let base_env = (self.deps.ssh_env)(&self.alias);

        if let Some(spec) = &spec {
            for command in &spec.before_connect {
                let outcome = run_hook(command, &base_env, spec.hook_timeout).await;
                self.report_tunnel_hook("before_connect", command, &outcome);
            }
            if let Err(message) = self.start_companions(spec, &base_env, history_size).await {
                self.fail_connect_attempt(&reconnect, message).await;
                return;
            }
        }

        let mut env = base_env;
        if self.deps.secrets.has(&self.alias) {
            let token = self.deps.askpass.issue(&self.alias);
            for (key, value) in askpass_env(&self.deps.helper_exe, &self.alias, &token) {
                env.insert(key, value);
            }
        }

        let mut child = match self.deps.launcher.spawn(&self.alias, &env) {
            Ok(child) => child,
            Err(e) => {
                // Spawn errors are not retryable; nothing about waiting
                // fixes a missing binary or a bad invocation.
                self.record_error(format!("ssh spawn failed: {e}"));
                self.emit(
                    Level::Error,
                    "tunnel_gave_up",
                    format!("tunnel {} gave up: ssh spawn failed", self.alias),
                );
                self.set_state(TunnelState::GaveUp);
                return;
            }
        };

        // Connect window: an exit in here is the retryable failure; a
        // child that outlives the window is considered established.
        let deadline = tokio::time::Instant::now() + reconnect.connect_window;
        loop {
            let event = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => WindowEvent::Settled,
                status = child.wait() => WindowEvent::Exited(status),
                command = self.commands.recv() => WindowEvent::Command(command),
            };
            match event {
                WindowEvent::Settled => {
                    self.child = Some(child);
                    self.enter_connected(spec.as_ref()).await;
                    return;
                }
                WindowEvent::Exited(status) => {
                    self.fail_connect_attempt(
                        &reconnect,
                        format!("ssh exited during connect: {}", describe_exit(status)),
                    )
                    .await;
                    return;
                }
                WindowEvent::Command(None) => {
                    self.stopping = true;
                    self.child = Some(child);
                    return;
                }
                WindowEvent::Command(Some(TunnelCommand::Disconnect)) => {
                    stop_process(&mut child, "INT", SHUTDOWN_GRACE).await;
                    self.stop_companions().await;
                    self.set_state(TunnelState::Disconnected);
                    return;
                }
                WindowEvent::Command(Some(TunnelCommand::Reconnect)) => {
                    stop_process(&mut child, "INT", SHUTDOWN_GRACE).await;
                    self.attempts = 0;
                    self.set_state(TunnelState::Connecting);
                    return;
                }
                WindowEvent::Command(Some(TunnelCommand::ResetRetries)) => {
                    self.attempts = 0;
                    self.info.lock().attempts = 0;
                }
                WindowEvent::Command(Some(TunnelCommand::Connect)) => {}
            }
        }
    }

    /// Retryable connect failure (taxonomy: early ssh exit, blocking
    /// companion failure).
    async fn fail_connect_attempt(&mut self, reconnect: &ReconnectSettings, message: String) {
        self.record_error(message.clone());
        self.emit(
            Level::Warn,
            "tunnel_connect_failed",
            format!("tunnel {}: {message}", self.alias),
        );
        if reconnect.enabled {
            self.set_state(TunnelState::Backoff);
        } else {
            self.stop_companions().await;
            self.set_state(TunnelState::Disconnected);
        }
    }

    async fn enter_connected(&mut self, spec: Option<&TunnelSpec>) {
        self.set_state(TunnelState::Connected);
        self.emit(Level::Info, "tunnel_connected", format!("tunnel {} connected", self.alias));

        if let Some(spec) = spec {
            let env = (self.deps.ssh_env)(&self.alias);
            for command in &spec.after_connect {
                let outcome = run_hook(command, &env, spec.hook_timeout).await;
                self.report_tunnel_hook("after_connect", command, &outcome);
            }
        }

        // Startup-only companions are done once the tunnel is up.
        let mut kept = Vec::new();
        for proc in std::mem::take(&mut self.companions) {
            if proc.is_running() && !proc.keep_alive && !proc.persistent {
                proc.stop().await;
            } else {
                kept.push(proc);
            }
        }
        self.companions = kept;
    }

    async fn watch_child(&mut self) {
        let Some(mut child) = self.child.take() else {
            self.set_state(TunnelState::Disconnected);
            return;
        };

        loop {
            let event = tokio::select! {
                status = child.wait() => ChildEvent::Exited(status),
                command = self.commands.recv() => ChildEvent::Command(command),
            };
            match event {
                ChildEvent::Exited(status) => {
                    let described = describe_exit(status);
                    self.record_error(format!("ssh exited: {described}"));
                    self.emit(
                        Level::Warn,
                        "tunnel_dropped",
                        format!("tunnel {} dropped: {described}", self.alias),
                    );
                    let reconnect = self.deps.settings.read().reconnect.clone();
                    if reconnect.enabled && self.attempts < reconnect.max_retries {
                        self.set_state(TunnelState::Backoff);
                    } else {
                        self.stop_companions().await;
                        self.set_state(TunnelState::Disconnected);
                    }
                    return;
                }
                ChildEvent::Command(None) => {
                    self.stopping = true;
                    self.child = Some(child);
                    return;
                }
                ChildEvent::Command(Some(TunnelCommand::Disconnect)) => {
                    stop_process(&mut child, "INT", SHUTDOWN_GRACE).await;
                    self.stop_companions().await;
                    self.emit(
                        Level::Info,
                        "tunnel_disconnected",
                        format!("tunnel {} disconnected", self.alias),
                    );
                    self.set_state(TunnelState::Disconnected);
                    return;
                }
                ChildEvent::Command(Some(TunnelCommand::Reconnect)) => {
                    stop_process(&mut child, "INT", SHUTDOWN_GRACE).await;
                    self.attempts = 0;
                    self.set_state(TunnelState::Connecting);
                    return;
                }
                ChildEvent::Command(Some(TunnelCommand::ResetRetries)) => {
                    self.attempts = 0;
                    self.info.lock().attempts = 0;
                }
                ChildEvent::Command(Some(TunnelCommand::Connect)) => {}
            }
        }
    }

    async fn backoff_wait(&mut self) {
        let reconnect = self.deps.settings.read().reconnect.clone();
        self.attempts += 1;
        self.info.lock().attempts = self.attempts;

        if self.attempts > reconnect.max_retries {
            let last = self.info.lock().last_error.clone().unwrap_or_default();
            self.emit(
                Level::Error,
                "tunnel_gave_up",
                format!(
                    "tunnel {} gave up after {} attempts: {last}",
                    self.alias, reconnect.max_retries
                ),
            );
            self.set_state(TunnelState::GaveUp);
            return;
        }

        let delay = backoff_delay(&reconnect, self.attempts - 1);
        {
            let mut info = self.info.lock();
            info.next_attempt_ms = Some(self.clock.epoch_ms() + delay.as_millis() as u64);
        }
        self.set_state(TunnelState::Backoff);
        self.emit(
            Level::Info,
            "tunnel_backoff",
            format!(
                "tunnel {} retrying in {:.1}s (attempt {})",
                self.alias,
                delay.as_secs_f64(),
                self.attempts
            ),
        );

        let deadline = tokio::time::Instant::now() + delay;
        loop {
            let event = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => None,
                command = self.commands.recv() => Some(command),
            };
            match event {
                None => {
                    self.set_state(TunnelState::Connecting);
                    return;
                }
                Some(None) => {
                    self.stopping = true;
                    return;
                }
                Some(Some(TunnelCommand::Disconnect)) => {
                    self.stop_companions().await;
                    self.set_state(TunnelState::Disconnected);
                    return;
                }
                Some(Some(TunnelCommand::Connect)) | Some(Some(TunnelCommand::Reconnect)) => {
                    self.attempts = 0;
                    self.set_state(TunnelState::Connecting);
                    return;
                }
                Some(Some(TunnelCommand::ResetRetries)) => {
                    self.attempts = 0;
                    self.info.lock().attempts = 0;
                }
            }
        }
    }

    async fn start_companions(
        &mut self,
        spec: &TunnelSpec,
        env: &HashMap<String, String>,
        history_size: usize,
    ) -> Result<(), String> {
        for companion in &spec.companions {
            // Adopt a persistent companion still running from an earlier
            // session.
            if let Some(existing) = self.deps.registry.take(&self.alias, &companion.name) {
                if existing.is_running() {
                    self.emit(
                        Level::Info,
                        "companion_adopted",
                        format!("companion {}/{} adopted", self.alias, companion.name),
                    );
                    self.companions.push(existing);
                    continue;
                }
                existing.stop().await;
            }
            // Keep companions that survived a backoff cycle.
            if self.companions.iter().any(|c| c.name == companion.name && c.is_running()) {
                continue;
            }
            // Stop and drop any finished entry under this name so a
            // fresh start replaces it instead of accumulating one per
            // retry cycle.
            let (stale, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.companions)
                .into_iter()
                .partition(|c| c.name == companion.name);
            self.companions = kept;
            for proc in stale {
                proc.stop().await;
            }

            match start_companion(companion, env, history_size).await {
                Ok(proc) => {
                    self.emit(
                        Level::Info,
                        "companion_ready",
                        format!("companion {}/{} ready", self.alias, companion.name),
                    );
                    self.companions.push(proc);
                }
                Err(e) => {
                    self.emit(
                        Level::Warn,
                        "companion_failed",
                        format!("companion {}/{} failed: {e}", self.alias, companion.name),
                    );
                    if companion.on_failure == OnFailure::Block {
                        return Err(format!("companion {} failed: {e}", companion.name));
                    }
                }
            }
        }
        Ok(())
    }

    /// Stop companions for this tunnel; persistent ones move to the
    /// process-wide registry instead.
    async fn stop_companions(&mut self) {
        for proc in std::mem::take(&mut self.companions) {
            if proc.persistent {
                self.deps.registry.store(&self.alias, proc);
            } else {
                proc.stop().await;
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut child) = self.child.take() {
            stop_process(&mut child, "INT", SHUTDOWN_GRACE).await;
        }
        self.deps.askpass.revoke(&self.alias);
        self.stop_companions().await;
        self.set_state(TunnelState::Disconnected);
    }

    fn set_state(&mut self, state: TunnelState) {
        self.state = state;
        let mut info = self.info.lock();
        info.state = state;
        info.attempts = self.attempts;
        match state {
            TunnelState::Connected => {
                info.connected_since_ms = Some(self.clock.epoch_ms());
            }
            _ => info.connected_since_ms = None,
        }
        if state != TunnelState::Backoff {
            info.next_attempt_ms = None;
        }
    }

    fn record_error(&mut self, message: String) {
        self.info.lock().last_error = Some(message);
    }

    fn emit(&self, level: Level, event: &str, message: String) {
        self.deps.streamer.emit(LogEntry::system(level, event, message));
    }

    fn report_tunnel_hook(&self, phase: &str, command: &str, outcome: &HookOutcome) {
        let level = if outcome.success { Level::Info } else { Level::Warn };
        self.deps.streamer.emit(LogEntry::hook(
            level,
            format!("{phase} hook for tunnel {}", self.alias),
            phase,
            "tunnel",
            &self.alias,
            command,
            outcome.success,
            outcome.duration.as_millis() as u64,
            outcome.output.clone(),
            outcome.error.clone(),
        ));
    }
}

fn describe_exit(status: std::io::Result<std::process::ExitStatus>) -> String {
    match status {
        Ok(status) => match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        },
        Err(e) => format!("wait failed: {e}"),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
