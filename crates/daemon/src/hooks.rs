// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook executor: opaque shell commands with timeout, output capture
//! and process-group cleanup.
//!
//! Each hook runs as `sh -c <command>` in its own process group so a
//! timeout can take down the whole tree, not just the shell. Output is
//! combined stdout+stderr, truncated at a fixed cap with an explicit
//! marker.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Captured output cap in bytes.
pub const MAX_HOOK_OUTPUT: usize = 4096;
/// Marker appended when output was cut at the cap.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Hook environment variable names.
pub const HOOK_TYPE_VAR: &str = "OVERSEER_HOOK_TYPE";
pub const HOOK_TARGET_TYPE_VAR: &str = "OVERSEER_HOOK_TARGET_TYPE";
pub const HOOK_TARGET_VAR: &str = "OVERSEER_HOOK_TARGET";

/// Result of one hook execution.
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub success: bool,
    pub duration: Duration,
    pub output: String,
    /// Exit-code, timeout, or spawn error description.
    pub error: Option<String>,
}

impl HookOutcome {
    fn failed(duration: Duration, output: String, error: String) -> Self {
        Self { success: false, duration, output, error: Some(error) }
    }
}

/// Run one hook command with the given extra environment and timeout.
///
/// Never returns an error: failures are data on the outcome. The hook
/// inherits the daemon's environment plus `env`.
pub async fn run_hook(
    command: &str,
    env: &HashMap<String, String>,
    timeout: Duration,
) -> HookOutcome {
    let started = Instant::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return HookOutcome::failed(
                started.elapsed(),
                String::new(),
                format!("spawn failed: {e}"),
            );
        }
    };

    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_task = tokio::spawn(read_capped(stdout, MAX_HOOK_OUTPUT));
    let err_task = tokio::spawn(read_capped(stderr, MAX_HOOK_OUTPUT));

    let waited = tokio::time::timeout(timeout, child.wait()).await;

    let outcome_error;
    let success;
    match waited {
        Ok(Ok(status)) => {
            success = status.success();
            outcome_error = if success {
                None
            } else {
                Some(match status.code() {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                })
            };
        }
        Ok(Err(e)) => {
            success = false;
            outcome_error = Some(format!("wait failed: {e}"));
        }
        Err(_) => {
            // Timeout: the whole process group gets a fatal signal.
            kill_group(pid);
            let _ = child.wait().await;
            success = false;
            outcome_error = Some(format!("timeout after {}ms", timeout.as_millis()));
        }
    }

    let (mut output, mut truncated) = out_task.await.unwrap_or_default();
    let (err_output, err_truncated) = err_task.await.unwrap_or_default();
    if output.len() < MAX_HOOK_OUTPUT {
        let take = (MAX_HOOK_OUTPUT - output.len()).min(err_output.len());
        output.extend_from_slice(&err_output[..take]);
        truncated = truncated || err_truncated || take < err_output.len();
    } else {
        truncated = truncated || !err_output.is_empty();
    }

    let mut output = String::from_utf8_lossy(&output).into_owned();
    if truncated {
        output.push_str(TRUNCATION_MARKER);
    }

    HookOutcome { success, duration: started.elapsed(), output, error: outcome_error }
}

/// Environment for an enter/leave hook: hook metadata plus the target's
/// merged environment.
pub fn hook_env(
    hook_type: &str,
    target_type: &str,
    target: &str,
    target_env: &indexmap::IndexMap<String, String>,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> =
        target_env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    env.insert(HOOK_TYPE_VAR.to_string(), hook_type.to_string());
    env.insert(HOOK_TARGET_TYPE_VAR.to_string(), target_type.to_string());
    env.insert(HOOK_TARGET_VAR.to_string(), target.to_string());
    env
}

fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    // The child was started as its own group leader, so its pid is the
    // group id.
    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        tracing::warn!(pid, error = %e, "failed to kill hook process group");
    }
}

async fn read_capped(
    reader: Option<impl tokio::io::AsyncRead + Unpin>,
    cap: usize,
) -> (Vec<u8>, bool) {
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 1024];
    let mut truncated = false;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < cap {
                    let take = (cap - buf.len()).min(n);
                    buf.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                    // Keep draining so the child never blocks on a full
                    // pipe.
                }
            }
            Err(_) => break,
        }
    }
    (buf, truncated)
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
