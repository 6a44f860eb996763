// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State manager: the single serialising owner of the sensor cache.
//!
//! Every mutation flows through one bounded command channel consumed by
//! one task, in submission order. Nothing else touches the cache, the
//! current snapshot, or the transitions stream; external readers get a
//! copy of the snapshot through a read-locked mirror.

use crate::env::{READINGS_QUEUE, TRANSITIONS_QUEUE};
use overseer_core::sensor::{force_check_sensor, LOCAL_IPV4, PUBLIC_IPV4, PUBLIC_IPV6};
use overseer_core::{
    Clock, OnlinePolicy, RuleEngine, SensorCache, SensorReading, StateSnapshot, StateTransition,
};
use parking_lot::RwLock;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type TransitionCallback = Box<dyn Fn(&StateTransition) + Send>;

/// Commands served by the manager task, strictly in order.
pub enum StateCommand {
    Reading(SensorReading),
    ForceCheck(String),
    Subscribe(TransitionCallback),
    SetEngine(RuleEngine),
    ExportCache(oneshot::Sender<Vec<SensorReading>>),
    RestoreCache(Vec<SensorReading>),
}

struct StateShared {
    snapshot: RwLock<Arc<StateSnapshot>>,
}

/// Cheap handle for submitting commands and reading the public mirror.
#[derive(Clone)]
pub struct StateHandle {
    commands: mpsc::Sender<StateCommand>,
    shared: Arc<StateShared>,
}

impl StateHandle {
    /// Non-blocking submit; drops the reading with a warning when the
    /// queue is full. A later reading re-converges.
    pub fn submit(&self, reading: SensorReading) {
        let sensor = reading.sensor.clone();
        if self.commands.try_send(StateCommand::Reading(reading)).is_err() {
            tracing::warn!(sensor, "readings queue full, dropping reading");
        }
    }

    /// Inject a synthetic `force_check:<reason>` reading purely to
    /// trigger re-evaluation.
    pub fn force_check(&self, reason: &str) {
        if self.commands.try_send(StateCommand::ForceCheck(reason.to_string())).is_err() {
            tracing::warn!(reason, "readings queue full, dropping force check");
        }
    }

    /// Current snapshot; a brief shared lock for a copy-out. Readers see
    /// the pre- or post-transition value, never a torn composite.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        Arc::clone(&self.shared.snapshot.read())
    }

    /// Register a callback invoked on every emitted transition.
    pub fn subscribe(&self, callback: impl Fn(&StateTransition) + Send + 'static) {
        let _ = self.commands.try_send(StateCommand::Subscribe(Box::new(callback)));
    }

    /// Swap the rule engine (configuration reload). Serialised with the
    /// readings, so no evaluation sees a half-updated rule set.
    pub fn set_engine(&self, engine: RuleEngine) {
        let _ = self.commands.try_send(StateCommand::SetEngine(engine));
    }

    /// Snapshot the sensor cache for crash-recovery persistence. File
    /// I/O stays with the caller; the manager only hands out data.
    pub async fn export_cache(&self) -> Vec<SensorReading> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(StateCommand::ExportCache(tx)).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Re-seed the cache from persisted readings and re-evaluate.
    /// Restoring an empty list is a no-op.
    pub fn restore_cache(&self, readings: Vec<SensorReading>) {
        let _ = self.commands.try_send(StateCommand::RestoreCache(readings));
    }
}

/// The serialising owner. Consumes commands until every handle is gone,
/// then drops the transitions sender, closing the stream.
pub struct StateManager<C: Clock> {
    commands: mpsc::Receiver<StateCommand>,
    cache: SensorCache,
    policy: Box<dyn OnlinePolicy>,
    engine: RuleEngine,
    current: Arc<StateSnapshot>,
    shared: Arc<StateShared>,
    transitions: mpsc::Sender<StateTransition>,
    subscribers: Vec<TransitionCallback>,
    clock: C,
}

impl<C: Clock> StateManager<C> {
    /// Build a manager plus its handle and the transitions stream. The
    /// initial snapshot is seeded from an evaluation over the empty
    /// cache; no transition is emitted for it.
    pub fn new(
        engine: RuleEngine,
        mut policy: Box<dyn OnlinePolicy>,
        clock: C,
    ) -> (Self, StateHandle, mpsc::Receiver<StateTransition>) {
        let (commands_tx, commands_rx) = mpsc::channel(READINGS_QUEUE);
        let (transitions_tx, transitions_rx) = mpsc::channel(TRANSITIONS_QUEUE);

        let cache = SensorCache::new();
        let now = clock.epoch_ms();
        let verdict = policy.evaluate(&cache, now);
        let result = engine.evaluate(&cache, verdict.online);
        let current = Arc::new(StateSnapshot::build(now, &verdict, &result, None, None, None));

        let shared = Arc::new(StateShared { snapshot: RwLock::new(Arc::clone(&current)) });
        let handle = StateHandle { commands: commands_tx, shared: Arc::clone(&shared) };

        let manager = Self {
            commands: commands_rx,
            cache,
            policy,
            engine,
            current,
            shared,
            transitions: transitions_tx,
            subscribers: Vec::new(),
            clock,
        };
        (manager, handle, transitions_rx)
    }

    /// Serve commands until the channel closes or `cancel` fires.
    pub async fn run(mut self, cancel: tokio_util::sync::CancellationToken) {
        loop {
            let command = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                _ = cancel.cancelled() => break,
            };
            match command {
                StateCommand::Reading(reading) => {
                    let trigger = reading.sensor.clone();
                    self.cache.update(reading);
                    self.reevaluate(&trigger);
                }
                StateCommand::ForceCheck(reason) => {
                    let sensor = force_check_sensor(&reason);
                    let reading = SensorReading::new(sensor.clone(), self.clock.epoch_ms());
                    self.cache.update(reading);
                    self.reevaluate(&sensor);
                }
                StateCommand::Subscribe(callback) => self.subscribers.push(callback),
                StateCommand::SetEngine(engine) => self.engine = engine,
                StateCommand::ExportCache(reply) => {
                    let _ = reply.send(self.cache.to_readings());
                }
                StateCommand::RestoreCache(readings) => {
                    if readings.is_empty() {
                        continue;
                    }
                    self.cache.restore(readings);
                    self.reevaluate("restore");
                }
            }
        }
        tracing::debug!("state manager stopped");
        // Dropping self here closes the transitions stream.
    }

    /// Policy → rules → candidate snapshot → diff → conditional emit.
    fn reevaluate(&mut self, trigger: &str) {
        let now = self.clock.epoch_ms();
        let verdict = self.policy.evaluate(&self.cache, now);
        let result = self.engine.evaluate(&self.cache, verdict.online);

        let candidate = StateSnapshot::build(
            now,
            &verdict,
            &result,
            self.cached_v4(PUBLIC_IPV4),
            self.cached_v6(),
            self.cached_v4(LOCAL_IPV4),
        );

        let changed = self.current.diff(&candidate);
        if changed.is_empty() {
            // The cache may have changed; the derived state did not.
            return;
        }

        let from = Arc::clone(&self.current);
        let to = Arc::new(candidate);
        self.current = Arc::clone(&to);
        *self.shared.snapshot.write() = Arc::clone(&to);

        let transition =
            StateTransition { from, to, trigger: trigger.to_string(), changed };

        for subscriber in &self.subscribers {
            subscriber(&transition);
        }

        if let Err(e) = self.transitions.try_send(transition) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!(trigger, "transitions queue full, dropping transition");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::debug!(trigger, "transitions stream closed");
                }
            }
        }
    }

    fn cached_v4(&self, sensor: &str) -> Option<Ipv4Addr> {
        match self.cache.get(sensor).and_then(|r| r.ip) {
            Some(IpAddr::V4(v4)) => Some(v4),
            _ => None,
        }
    }

    fn cached_v6(&self) -> Option<Ipv6Addr> {
        match self.cache.get(PUBLIC_IPV6).and_then(|r| r.ip) {
            Some(IpAddr::V6(v6)) => Some(v6),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
