// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, crash recovery, shutdown.

use crate::effects::atomic_write;
use crate::listener::{ListenCtx, Listener};
use crate::logstream::LogStreamer;
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::secrets::FileSecretStore;
use crate::storage::StateLog;
use crate::tunnel::SshCommandLauncher;
use fs2::FileExt;
use overseer_config::{ensure_config_file, load_file, BasePaths, ParseError};
use overseer_core::SensorReading;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no home directory; cannot locate the base directory")]
    NoHome,

    #[error("another daemon already holds {0}")]
    AlreadyRunning(String),

    #[error(transparent)]
    Config(#[from] ParseError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> LifecycleError + '_ {
    move |source| LifecycleError::Io { path: path.display().to_string(), source }
}

/// A running daemon.
pub struct DaemonState {
    pub paths: BasePaths,
    pub orchestrator: Arc<Orchestrator>,
    listener_cancel: CancellationToken,
    listener_task: JoinHandle<()>,
    // NOTE(lifetime): held to maintain the exclusive pid-file lock;
    // released on drop
    #[allow(dead_code)]
    lock_file: File,
    _log_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Bring the daemon up under `base`: config, pid lock, socket,
/// orchestrator, cached-sensor recovery, listener.
pub async fn startup(base: PathBuf, probes_enabled: bool) -> Result<DaemonState, LifecycleError> {
    let paths = BasePaths::new(base);
    std::fs::create_dir_all(&paths.base).map_err(io_err(&paths.base))?;

    let created = ensure_config_file(&paths.config)?;
    let config = load_file(&paths.config)?;

    let log_guard = init_tracing(&paths, config.verbose);
    if created {
        info!(path = %paths.config.display(), "created default configuration");
    }

    // Exclusive pid lock; a second daemon must refuse to start.
    let mut lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&paths.pid)
        .map_err(io_err(&paths.pid))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::AlreadyRunning(paths.pid.display().to_string()))?;
    lock_file.set_len(0).map_err(io_err(&paths.pid))?;
    writeln!(lock_file, "{}", std::process::id()).map_err(io_err(&paths.pid))?;

    // A stale socket from a crashed daemon blocks the bind.
    if paths.socket.exists() {
        std::fs::remove_file(&paths.socket).map_err(io_err(&paths.socket))?;
    }
    let unix_listener = UnixListener::bind(&paths.socket).map_err(io_err(&paths.socket))?;

    let streamer = LogStreamer::new(config.log.ring_size);
    let state_log = StateLog::new(paths.state_log.clone());
    let secrets = Arc::new(FileSecretStore::new(paths.secrets.clone()));
    let launcher = Arc::new(SshCommandLauncher {
        server_alive_interval: config.ssh.server_alive_interval,
        server_alive_count_max: config.ssh.server_alive_count_max,
    });
    let helper_exe =
        std::env::current_exe().unwrap_or_else(|_| PathBuf::from("overseer"));

    let orchestrator = Orchestrator::start(OrchestratorOptions {
        config,
        streamer,
        launcher,
        secrets,
        state_log: Some(state_log),
        helper_exe,
        probes_enabled,
    })
    .await;

    restore_sensor_cache(&paths, &orchestrator);

    let listener_cancel = CancellationToken::new();
    let ctx = Arc::new(ListenCtx {
        orchestrator: Arc::clone(&orchestrator),
        config_path: paths.config.clone(),
        start_time: Instant::now(),
        cancel: listener_cancel.clone(),
    });
    let listener_task = tokio::spawn(Listener::new(unix_listener, ctx).run());

    info!(socket = %paths.socket.display(), "daemon ready");
    Ok(DaemonState {
        paths,
        orchestrator,
        listener_cancel,
        listener_task,
        lock_file,
        _log_guard: log_guard,
    })
}

/// Orderly shutdown: persist the sensor cache, stop the listener, stop
/// the orchestrator, remove the runtime files.
pub async fn shutdown(state: DaemonState) {
    save_sensor_cache(&state.paths, &state.orchestrator).await;

    state.listener_cancel.cancel();
    let _ = state.listener_task.await;

    state.orchestrator.stop().await;

    let _ = std::fs::remove_file(&state.paths.socket);
    let _ = std::fs::remove_file(&state.paths.pid);
    info!("daemon stopped");
}

fn restore_sensor_cache(paths: &BasePaths, orchestrator: &Orchestrator) {
    let content = match std::fs::read_to_string(&paths.sensor_cache) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(error = %e, "failed to read sensor cache");
            return;
        }
    };
    match serde_json::from_str::<Vec<SensorReading>>(&content) {
        Ok(readings) if readings.is_empty() => {}
        Ok(readings) => {
            info!(count = readings.len(), "restoring cached sensor readings");
            orchestrator.state_handle().restore_cache(readings);
        }
        Err(e) => warn!(error = %e, "ignoring malformed sensor cache"),
    }
}

async fn save_sensor_cache(paths: &BasePaths, orchestrator: &Orchestrator) {
    let readings = orchestrator.state_handle().export_cache().await;
    match serde_json::to_string_pretty(&readings) {
        Ok(json) => {
            if let Err(e) = atomic_write(&paths.sensor_cache, &format!("{json}\n")) {
                warn!(error = %e, "failed to persist sensor cache");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize sensor cache"),
    }
}

fn init_tracing(
    paths: &BasePaths,
    verbose: i64,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let default_level = match verbose {
        v if v >= 2 => "trace",
        1 => "debug",
        _ => "info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    // Another subscriber may already be installed (tests); that's fine.
    if result.is_err() {
        return None;
    }
    Some(guard)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
