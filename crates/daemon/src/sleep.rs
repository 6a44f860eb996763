// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sleep monitor: a predicate plus edge callbacks, never a suspender.
//!
//! Probes and the tunnel supervisor consult `is_suppressed()` before
//! external I/O and skip their iteration while it reports true: during
//! sleep, for a grace window after wake, and for a short dark-wake
//! window when the platform reports a wake with the user not yet
//! active. Platform event wiring lives outside the daemon; something
//! feeds `handle_sleep` / `handle_wake` edges in.

use crate::env::{DARK_WAKE_WINDOW, WAKE_GRACE};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

type EdgeCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct SleepMonitor {
    inner: Arc<Mutex<SleepState>>,
    grace: Duration,
    dark_wake: Duration,
}

struct SleepState {
    sleeping: bool,
    woke_at: Option<Instant>,
    dark_wake_until: Option<Instant>,
    on_sleep: Vec<EdgeCallback>,
    on_wake: Vec<EdgeCallback>,
}

impl SleepMonitor {
    pub fn new() -> Self {
        Self::with_windows(WAKE_GRACE, DARK_WAKE_WINDOW)
    }

    pub fn with_windows(grace: Duration, dark_wake: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SleepState {
                sleeping: false,
                woke_at: None,
                dark_wake_until: None,
                on_sleep: Vec::new(),
                on_wake: Vec::new(),
            })),
            grace,
            dark_wake,
        }
    }

    pub fn on_sleep(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().on_sleep.push(Arc::new(callback));
    }

    pub fn on_wake(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().on_wake.push(Arc::new(callback));
    }

    /// Sleep edge. Repeated notifications while already sleeping fire no
    /// callbacks.
    pub fn handle_sleep(&self) {
        let callbacks = {
            let mut state = self.inner.lock();
            if state.sleeping {
                return;
            }
            state.sleeping = true;
            state.woke_at = None;
            state.dark_wake_until = None;
            state.on_sleep.clone()
        };
        // Callbacks run outside the lock; they may call back into the
        // monitor.
        for callback in callbacks {
            callback();
        }
    }

    /// Wake edge. A no-op when not currently sleeping. `user_active`
    /// comes from the platform; a wake without an active user arms the
    /// dark-wake window.
    pub fn handle_wake(&self, user_active: bool) {
        let callbacks = {
            let mut state = self.inner.lock();
            if !state.sleeping {
                return;
            }
            state.sleeping = false;
            let now = Instant::now();
            state.woke_at = Some(now);
            state.dark_wake_until = if user_active { None } else { Some(now + self.dark_wake) };
            state.on_wake.clone()
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Whether probes should skip their current iteration.
    pub fn is_suppressed(&self) -> bool {
        let state = self.inner.lock();
        if state.sleeping {
            return true;
        }
        let now = Instant::now();
        if let Some(woke_at) = state.woke_at {
            if now.duration_since(woke_at) < self.grace {
                return true;
            }
        }
        if let Some(until) = state.dark_wake_until {
            if now < until {
                return true;
            }
        }
        false
    }
}

impl Default for SleepMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "sleep_tests.rs"]
mod tests;
