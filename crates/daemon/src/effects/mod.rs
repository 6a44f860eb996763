// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects processor: ordered side effects per state transition.
//!
//! One task consumes the transitions stream and runs each transition to
//! completion before looking at the next: leave-hooks, state log
//! entries, state-log records, env-file writes, enter-hooks, then user
//! callbacks. Failures are recorded, never raised, and never stop the
//! remaining effects.
//!
//! Hook nesting treats the location as the outer scope and the context
//! as the inner one: leaving unwinds context before location
//! (specific-target hooks before global), entering runs location before
//! context (global hooks before specific).

mod envfile;

pub use envfile::{atomic_write, overseer_vars, EnvFileWriter, WriterKind, OVERSEER_VAR_NAMES};

use crate::hooks::{hook_env, run_hook, HookOutcome};
use crate::logstream::LogStreamer;
use crate::storage::{StateLog, StateRecord};
use chrono::Utc;
use overseer_config::{Config, IpFamily};
use overseer_core::{ChangedField, Hooks, Level, LogEntry, StateTransition};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Hook commands looked up per transition side.
#[derive(Debug, Clone, Default)]
pub struct HookSources {
    pub global_location: Hooks,
    pub global_context: Hooks,
    pub locations: HashMap<String, Hooks>,
    pub contexts: HashMap<String, Hooks>,
}

impl HookSources {
    pub fn from_config(config: &Config) -> Self {
        Self {
            global_location: config.location_hooks.clone(),
            global_context: config.context_hooks.clone(),
            locations: config
                .locations
                .iter()
                .map(|l| (l.name.clone(), l.hooks.clone()))
                .collect(),
            contexts: config.rules.iter().map(|r| (r.name.clone(), r.hooks.clone())).collect(),
        }
    }
}

/// The reload-swappable part of the processor.
pub struct EffectsConfig {
    pub hooks: HookSources,
    pub writers: Vec<EnvFileWriter>,
    pub preferred_ip: IpFamily,
}

impl EffectsConfig {
    pub fn from_config(config: &Config) -> Self {
        let mut writers = Vec::new();
        let exports = &config.exports;
        if let Some(path) = &exports.dotenv {
            writers.push(EnvFileWriter::new(WriterKind::Dotenv, path.clone()));
        }
        if let Some(path) = &exports.context {
            writers.push(EnvFileWriter::new(WriterKind::Context, path.clone()));
        }
        if let Some(path) = &exports.location {
            writers.push(EnvFileWriter::new(WriterKind::Location, path.clone()));
        }
        if let Some(path) = &exports.public_ip {
            writers.push(EnvFileWriter::new(WriterKind::PublicIp, path.clone()));
        }
        Self {
            hooks: HookSources::from_config(config),
            writers,
            preferred_ip: exports.preferred_ip,
        }
    }
}

type OnlineCallback = Box<dyn Fn(bool) + Send + Sync>;
type ContextCallback = Box<dyn Fn(&StateTransition) + Send + Sync>;

struct HookJob {
    command: String,
    timeout: std::time::Duration,
    hook_type: &'static str,
    target_type: &'static str,
    target: String,
    env: HashMap<String, String>,
}

pub struct EffectsProcessor {
    transitions: mpsc::Receiver<StateTransition>,
    streamer: LogStreamer,
    config: Arc<RwLock<EffectsConfig>>,
    state_log: Option<StateLog>,
    last_ipv4: Arc<Mutex<Option<Ipv4Addr>>>,
    on_online_change: Option<OnlineCallback>,
    on_context_change: Option<ContextCallback>,
}

impl EffectsProcessor {
    pub fn new(
        transitions: mpsc::Receiver<StateTransition>,
        streamer: LogStreamer,
        config: Arc<RwLock<EffectsConfig>>,
        state_log: Option<StateLog>,
    ) -> Self {
        Self {
            transitions,
            streamer,
            config,
            state_log,
            last_ipv4: Arc::new(Mutex::new(None)),
            on_online_change: None,
            on_context_change: None,
        }
    }

    /// Called when the `online` field changed, with the new value.
    pub fn on_online_change(&mut self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.on_online_change = Some(Box::new(callback));
    }

    /// Called when the `context` field changed.
    pub fn on_context_change(
        &mut self,
        callback: impl Fn(&StateTransition) + Send + Sync + 'static,
    ) {
        self.on_context_change = Some(Box::new(callback));
    }

    /// The most recent non-empty IPv4 written out to env files. Tunnel
    /// startup reads this instead of the in-memory snapshot so it never
    /// races ahead of what hooks and scripts can see on disk.
    pub fn last_written_ipv4(&self) -> Arc<Mutex<Option<Ipv4Addr>>> {
        Arc::clone(&self.last_ipv4)
    }

    pub async fn run(mut self) {
        while let Some(transition) = self.transitions.recv().await {
            self.process(&transition).await;
        }
        tracing::debug!("effects processor stopped");
    }

    async fn process(&mut self, t: &StateTransition) {
        self.run_hooks(t, false).await;
        self.emit_state_entries(t);
        self.append_state_records(t);
        self.write_env_files(t);
        self.run_hooks(t, true).await;
        self.fire_callbacks(t);
    }

    /// Leave (enter = false) or enter (enter = true) hooks for the sides
    /// that changed.
    async fn run_hooks(&self, t: &StateTransition, enter: bool) {
        let jobs = self.collect_hook_jobs(t, enter);
        for job in jobs {
            let started = Instant::now();
            let outcome = run_hook(&job.command, &job.env, job.timeout).await;
            self.report_hook(&job, &outcome);
            tracing::trace!(
                command = %job.command,
                took_ms = started.elapsed().as_millis() as u64,
                "hook finished"
            );
        }
    }

    fn collect_hook_jobs(&self, t: &StateTransition, enter: bool) -> Vec<HookJob> {
        let config = self.config.read();
        let hooks = &config.hooks;

        let snapshot = if enter { &t.to } else { &t.from };
        let hook_type: &'static str = if enter { "enter" } else { "leave" };

        // Sides in execution order. Entering runs the outer scope
        // (location) before the inner one (context); leaving unwinds
        // context before location.
        let location = t.location_changed().then(|| {
            let name = if enter { &t.to.location } else { &t.from.location };
            ("location", name, hooks.locations.get(name.as_str()), &hooks.global_location)
        });
        let context = t.context_changed().then(|| {
            let name = if enter { &t.to.context } else { &t.from.context };
            ("context", name, hooks.contexts.get(name.as_str()), &hooks.global_context)
        });
        let sides = if enter {
            [location, context]
        } else {
            [context, location]
        };

        let mut jobs = Vec::new();
        for (target_type, target, specific, global) in sides.into_iter().flatten() {
            if target.is_empty() {
                continue;
            }
            let env = hook_env(hook_type, target_type, target, &snapshot.environment);
            let push = |jobs: &mut Vec<HookJob>, commands: &[String], timeout| {
                for command in commands {
                    jobs.push(HookJob {
                        command: command.clone(),
                        timeout,
                        hook_type,
                        target_type,
                        target: target.clone(),
                        env: env.clone(),
                    });
                }
            };
            let specific_cmds = specific
                .map(|h| (if enter { h.on_enter.as_slice() } else { h.on_leave.as_slice() }, h.timeout));
            let global_cmds =
                (if enter { global.on_enter.as_slice() } else { global.on_leave.as_slice() }, global.timeout);

            if enter {
                // Global first, then specific (outermost-first).
                push(&mut jobs, global_cmds.0, global_cmds.1);
                if let Some((commands, timeout)) = specific_cmds {
                    push(&mut jobs, commands, timeout);
                }
            } else {
                // Specific first, then global (LIFO unwinding).
                if let Some((commands, timeout)) = specific_cmds {
                    push(&mut jobs, commands, timeout);
                }
                push(&mut jobs, global_cmds.0, global_cmds.1);
            }
        }

        jobs
    }

    fn report_hook(&self, job: &HookJob, outcome: &HookOutcome) {
        let level = if outcome.success { Level::Info } else { Level::Warn };
        let duration_ms = outcome.duration.as_millis() as u64;
        self.streamer.emit(LogEntry::hook(
            level,
            format!("{} hook for {} {:?}", job.hook_type, job.target_type, job.target),
            job.hook_type,
            job.target_type,
            &job.target,
            &job.command,
            outcome.success,
            duration_ms,
            outcome.output.clone(),
            outcome.error.clone(),
        ));
        self.streamer.emit(LogEntry::effect(
            level,
            format!("{}_hook {}", job.hook_type, job.target),
            format!("{}_hook:{}:{}", job.hook_type, job.target_type, job.target),
            outcome.success,
            duration_ms,
            outcome.error.clone(),
        ));
    }

    /// One `state` entry per changed field.
    fn emit_state_entries(&self, t: &StateTransition) {
        for field in &t.changed {
            let from = t.from.field_value(*field);
            let to = t.to.field_value(*field);
            self.streamer.emit(LogEntry::state(
                format!("{field} changed"),
                field.as_str(),
                from,
                to,
            ));
        }
    }

    fn append_state_records(&self, t: &StateTransition) {
        let Some(state_log) = &self.state_log else {
            return;
        };
        let started = Instant::now();
        let mut first_error: Option<String> = None;

        for field in &t.changed {
            let record = match field {
                ChangedField::Online
                | ChangedField::Ipv4
                | ChangedField::Ipv6
                | ChangedField::LocalIpv4 => StateRecord::SensorChange {
                    timestamp: Utc::now(),
                    field: field.as_str().to_string(),
                    from: t.from.field_value(*field),
                    to: t.to.field_value(*field),
                    trigger: t.trigger.clone(),
                },
                ChangedField::Context | ChangedField::Location => continue,
            };
            if let Err(e) = state_log.append(&record) {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }

        if t.context_changed() || t.location_changed() {
            let record = StateRecord::ContextChange {
                timestamp: Utc::now(),
                context_from: t.from.context.clone(),
                context_to: t.to.context.clone(),
                location_from: t.from.location.clone(),
                location_to: t.to.location.clone(),
                trigger: t.trigger.clone(),
            };
            if let Err(e) = state_log.append(&record) {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }

        let success = first_error.is_none();
        let level = if success { Level::Debug } else { Level::Warn };
        self.streamer.emit(LogEntry::effect(
            level,
            "state log appended",
            "state_log",
            success,
            started.elapsed().as_millis() as u64,
            first_error,
        ));
    }

    fn write_env_files(&self, t: &StateTransition) {
        let mut config = self.config.write();
        let preferred = config.preferred_ip;
        if config.writers.is_empty() {
            drop(config);
            self.note_externalised_ipv4(t, true);
            return;
        }

        let mut results = Vec::new();
        for writer in &mut config.writers {
            let started = Instant::now();
            let result = writer.write(&t.to, preferred);
            results.push((
                writer.kind().as_str(),
                result.map_err(|e| e.to_string()),
                started.elapsed().as_millis() as u64,
            ));
        }
        drop(config);

        let mut all_ok = true;
        for (kind, result, duration_ms) in results {
            let (success, error) = match result {
                Ok(()) => (true, None),
                Err(e) => (false, Some(e)),
            };
            all_ok &= success;
            let level = if success { Level::Debug } else { Level::Warn };
            self.streamer.emit(LogEntry::effect(
                level,
                format!("env file {kind} written"),
                format!("env_file:{kind}"),
                success,
                duration_ms,
                error,
            ));
        }

        self.note_externalised_ipv4(t, all_ok);
    }

    /// Track the last non-empty IPv4 successfully written out.
    fn note_externalised_ipv4(&self, t: &StateTransition, written: bool) {
        if !written {
            return;
        }
        if let Some(ipv4) = t.to.public_ipv4 {
            if ipv4 != Ipv4Addr::UNSPECIFIED {
                *self.last_ipv4.lock() = Some(ipv4);
            }
        }
    }

    fn fire_callbacks(&self, t: &StateTransition) {
        if t.online_changed() {
            if let Some(callback) = &self.on_online_change {
                callback(t.to.online);
            }
        }
        if t.context_changed() {
            if let Some(callback) = &self.on_context_change {
                callback(t);
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
