// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Companion sidecar processes.
//!
//! A companion is started before its tunnel's SSH child and waited on
//! per its `wait_mode`: `completion` expects a successful exit within
//! the timeout, `string` watches combined stdout/stderr for a marker.
//! Long-lived companions are owned by a keeper task that handles stop
//! signals, the auto-restart policy, and the running flag; `persistent`
//! companions outlive their tunnel by moving into the process-wide
//! registry on tunnel shutdown.

use crate::env::SHUTDOWN_GRACE;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use overseer_config::{CompanionSpec, WaitMode};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error("spawn failed: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("exited with code {0} during startup")]
    StartupExit(i32),

    #[error("exited before reporting ready")]
    ExitedBeforeReady,

    #[error("timed out waiting for readiness")]
    WaitTimeout,
}

#[derive(Debug)]
pub struct CompanionProc {
    pub name: String,
    pub persistent: bool,
    pub keep_alive: bool,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    history: Arc<Mutex<VecDeque<String>>>,
    keeper: Option<JoinHandle<()>>,
}

impl CompanionProc {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Retained output lines, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().iter().cloned().collect()
    }

    /// Signal the companion's process group and wait for the keeper to
    /// finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(keeper) = self.keeper.take() {
            let _ = keeper.await;
        }
    }
}

/// Start one companion and wait for its readiness condition.
pub async fn start_companion(
    spec: &CompanionSpec,
    extra_env: &HashMap<String, String>,
    history_size: usize,
) -> Result<CompanionProc, CompanionError> {
    let history = Arc::new(Mutex::new(VecDeque::with_capacity(history_size.min(256))));
    let (mut child, mut lines) =
        spawn_companion_child(spec, extra_env, &history, history_size)?;

    let running = Arc::new(AtomicBool::new(true));
    let cancel = CancellationToken::new();

    match spec.wait_mode {
        WaitMode::Completion => {
            match tokio::time::timeout(spec.timeout, child.wait()).await {
                Ok(Ok(status)) if status.success() => {
                    running.store(false, Ordering::SeqCst);
                }
                Ok(Ok(status)) => {
                    return Err(CompanionError::StartupExit(status.code().unwrap_or(-1)));
                }
                Ok(Err(e)) => return Err(CompanionError::Spawn(e)),
                Err(_) => {
                    stop_process(&mut child, &spec.stop_signal, SHUTDOWN_GRACE).await;
                    return Err(CompanionError::WaitTimeout);
                }
            }
        }
        WaitMode::String => {
            let marker = spec.wait_for.clone().unwrap_or_default();
            let deadline = tokio::time::Instant::now() + spec.timeout;
            loop {
                tokio::select! {
                    line = lines.recv() => match line {
                        Some(line) if line.contains(&marker) => break,
                        Some(_) => continue,
                        None => {
                            let _ = child.wait().await;
                            return Err(CompanionError::ExitedBeforeReady);
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => {
                        stop_process(&mut child, &spec.stop_signal, SHUTDOWN_GRACE).await;
                        return Err(CompanionError::WaitTimeout);
                    }
                }
            }
        }
    }

    if let Some(delay) = spec.ready_delay {
        tokio::time::sleep(delay).await;
    }

    // Completion-mode companions have already finished; everything else
    // gets a keeper task owning the child.
    let keeper = if running.load(Ordering::SeqCst) {
        Some(tokio::spawn(keep_companion(
            child,
            spec.clone(),
            extra_env.clone(),
            Arc::clone(&history),
            history_size,
            Arc::clone(&running),
            cancel.clone(),
        )))
    } else {
        None
    };

    Ok(CompanionProc {
        name: spec.name.clone(),
        persistent: spec.persistent,
        keep_alive: spec.keep_alive,
        cancel,
        running,
        history,
        keeper,
    })
}

/// Owner loop for a long-lived companion: stop on cancellation, respawn
/// on unexpected exit when `auto_restart` is set.
async fn keep_companion(
    mut child: Child,
    spec: CompanionSpec,
    extra_env: HashMap<String, String>,
    history: Arc<Mutex<VecDeque<String>>>,
    history_size: usize,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                stop_process(&mut child, &spec.stop_signal, SHUTDOWN_GRACE).await;
                running.store(false, Ordering::SeqCst);
                break;
            }
            status = child.wait() => {
                running.store(false, Ordering::SeqCst);
                if cancel.is_cancelled() {
                    break;
                }
                let code = status.ok().and_then(|s| s.code());
                if !spec.auto_restart {
                    tracing::debug!(companion = %spec.name, ?code, "companion exited");
                    break;
                }
                tracing::warn!(companion = %spec.name, ?code, "companion exited, restarting");
                match spawn_companion_child(&spec, &extra_env, &history, history_size) {
                    Ok((new_child, _lines)) => {
                        child = new_child;
                        running.store(true, Ordering::SeqCst);
                    }
                    Err(e) => {
                        tracing::error!(companion = %spec.name, error = %e, "companion restart failed");
                        break;
                    }
                }
            }
        }
    }
}

/// Spawn the companion's shell command with line readers feeding the
/// shared history and a readiness channel.
fn spawn_companion_child(
    spec: &CompanionSpec,
    extra_env: &HashMap<String, String>,
    history: &Arc<Mutex<VecDeque<String>>>,
    history_size: usize,
) -> std::io::Result<(Child, mpsc::UnboundedReceiver<String>)> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&spec.command)
        .envs(extra_env)
        .envs(spec.environment.iter().map(|(k, v)| (k.clone(), v.clone())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);
    if let Some(workdir) = &spec.workdir {
        cmd.current_dir(workdir);
    }

    let mut child = cmd.spawn()?;
    let (tx, rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_lines(stdout, Arc::clone(history), history_size, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_lines(stderr, Arc::clone(history), history_size, tx));
    }

    Ok((child, rx))
}

async fn read_lines(
    stream: impl tokio::io::AsyncRead + Unpin,
    history: Arc<Mutex<VecDeque<String>>>,
    history_size: usize,
    tx: mpsc::UnboundedSender<String>,
) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        {
            let mut history = history.lock();
            if history.len() == history_size.max(1) {
                history.pop_front();
            }
            history.push_back(line.clone());
        }
        // Receiver may be gone once readiness was decided.
        let _ = tx.send(line);
    }
}

/// Signal a child's process group, grant a grace period, then SIGKILL.
pub async fn stop_process(child: &mut Child, signal: &str, grace: std::time::Duration) {
    let sig = parse_signal(signal);
    if let Some(pid) = child.id() {
        let _ = killpg(Pid::from_raw(pid as i32), sig);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        if let Some(pid) = child.id() {
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
        let _ = child.wait().await;
    }
}

/// Signal name (no SIG prefix) to signal. Unknown names fall back to
/// SIGINT, the configured default.
pub fn parse_signal(name: &str) -> Signal {
    match name {
        "TERM" => Signal::SIGTERM,
        "KILL" => Signal::SIGKILL,
        "HUP" => Signal::SIGHUP,
        "QUIT" => Signal::SIGQUIT,
        "USR1" => Signal::SIGUSR1,
        "USR2" => Signal::SIGUSR2,
        _ => Signal::SIGINT,
    }
}

/// Process-wide home for `persistent` companions whose tunnel stopped.
#[derive(Clone, Default)]
pub struct CompanionRegistry {
    inner: Arc<Mutex<HashMap<String, CompanionProc>>>,
}

impl CompanionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(alias: &str, name: &str) -> String {
        format!("{alias}/{name}")
    }

    pub fn store(&self, alias: &str, proc: CompanionProc) {
        let key = Self::key(alias, &proc.name);
        self.inner.lock().insert(key, proc);
    }

    pub fn take(&self, alias: &str, name: &str) -> Option<CompanionProc> {
        self.inner.lock().remove(&Self::key(alias, name))
    }

    /// Stop everything still parked here (daemon shutdown).
    pub async fn stop_all(&self) {
        let procs: Vec<CompanionProc> = {
            let mut inner = self.inner.lock();
            inner.drain().map(|(_, proc)| proc).collect()
        };
        for proc in procs {
            proc.stop().await;
        }
    }
}

#[cfg(test)]
#[path = "companion_tests.rs"]
mod tests;
