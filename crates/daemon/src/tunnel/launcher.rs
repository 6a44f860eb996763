// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH process launching behind a trait seam.
//!
//! The supervisor only needs "give me a child process for this alias";
//! how the ssh command line is assembled stays swappable, and tests
//! inject fakes that spawn plain shell commands instead.

use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::{Child, Command};

pub trait SshLauncher: Send + Sync {
    fn spawn(&self, alias: &str, env: &HashMap<String, String>) -> std::io::Result<Child>;
}

/// Default launcher: `ssh -N <alias>` with keep-alive options. The alias
/// carries the connection details via the user's ssh config.
pub struct SshCommandLauncher {
    pub server_alive_interval: u64,
    pub server_alive_count_max: u32,
}

impl SshLauncher for SshCommandLauncher {
    fn spawn(&self, alias: &str, env: &HashMap<String, String>) -> std::io::Result<Child> {
        Command::new("ssh")
            .arg("-N")
            .arg("-o")
            .arg(format!("ServerAliveInterval={}", self.server_alive_interval))
            .arg("-o")
            .arg(format!("ServerAliveCountMax={}", self.server_alive_count_max))
            .arg(alias)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
    }
}

/// Test launcher: runs a scripted shell command (or refuses to spawn)
/// and records every spawn with its environment.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeLauncher {
    behavior: parking_lot::Mutex<FakeBehavior>,
    spawns: parking_lot::Mutex<Vec<(String, HashMap<String, String>)>>,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub enum FakeBehavior {
    /// Spawn `sh -c <command>`.
    Run(String),
    /// Fail the spawn itself.
    FailSpawn,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeLauncher {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior: parking_lot::Mutex::new(behavior),
            spawns: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// A child that stays up until stopped.
    pub fn running_forever() -> Self {
        Self::new(FakeBehavior::Run("sleep 86400".to_string()))
    }

    /// A child that exits immediately with the given code.
    pub fn exiting_immediately(code: i32) -> Self {
        Self::new(FakeBehavior::Run(format!("exit {code}")))
    }

    pub fn failing_spawn() -> Self {
        Self::new(FakeBehavior::FailSpawn)
    }

    pub fn set_behavior(&self, behavior: FakeBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Aliases and environments of every spawn so far.
    pub fn spawns(&self) -> Vec<(String, HashMap<String, String>)> {
        self.spawns.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl SshLauncher for FakeLauncher {
    fn spawn(&self, alias: &str, env: &HashMap<String, String>) -> std::io::Result<Child> {
        let behavior = self.behavior.lock().clone();
        self.spawns.lock().push((alias.to_string(), env.clone()));
        match behavior {
            FakeBehavior::Run(command) => Command::new("sh")
                .arg("-c")
                .arg(command)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .process_group(0)
                .spawn(),
            FakeBehavior::FailSpawn => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ssh binary not found",
            )),
        }
    }
}
