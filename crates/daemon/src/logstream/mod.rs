// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered fan-out of structured log entries with bounded history.
//!
//! One exclusive lock covers the ring buffer and the subscriber table,
//! which makes the emit order a total order across all sources and lets
//! `subscribe` splice its replay in atomically: live entries strictly
//! follow the replayed prefix.

mod render;

pub use render::render;

use crate::env::LOG_SUBSCRIBER_QUEUE;
use overseer_core::LogEntry;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct LogStreamer {
    inner: Arc<Mutex<StreamState>>,
}

struct StreamState {
    ring: VecDeque<Arc<LogEntry>>,
    capacity: usize,
    subscribers: HashMap<u64, mpsc::Sender<Arc<LogEntry>>>,
    next_id: u64,
}

impl LogStreamer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamState {
                ring: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                subscribers: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Store the entry in the ring and deliver it to every subscriber.
    /// Delivery is non-blocking; a full subscriber queue drops the entry
    /// for that subscriber only.
    pub fn emit(&self, entry: LogEntry) {
        let entry = Arc::new(entry);
        let mut state = self.inner.lock();

        if state.ring.len() == state.capacity {
            state.ring.pop_front();
        }
        state.ring.push_back(Arc::clone(&entry));

        let mut dead = Vec::new();
        for (id, tx) in &state.subscribers {
            match tx.try_send(Arc::clone(&entry)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = id, "log subscriber queue full, dropping entry");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
            }
        }
        for id in dead {
            state.subscribers.remove(&id);
        }
    }

    /// Register a subscriber. With `replay`, the last `lines` ring
    /// entries are queued ahead of any live emission.
    pub fn subscribe(&self, replay: bool, lines: usize) -> (u64, mpsc::Receiver<Arc<LogEntry>>) {
        let mut state = self.inner.lock();

        let capacity = if replay {
            LOG_SUBSCRIBER_QUEUE.max(lines.min(state.capacity))
        } else {
            LOG_SUBSCRIBER_QUEUE
        };
        let (tx, rx) = mpsc::channel(capacity.max(1));

        if replay && lines > 0 {
            let start = state.ring.len().saturating_sub(lines);
            for entry in state.ring.iter().skip(start) {
                // The queue was sized for the replay; a failure here can
                // only mean the receiver is already gone.
                let _ = tx.try_send(Arc::clone(entry));
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.inner.lock().subscribers.remove(&id);
    }

    /// Current ring tail, newest last.
    pub fn history(&self, lines: usize) -> Vec<Arc<LogEntry>> {
        let state = self.inner.lock();
        let start = state.ring.len().saturating_sub(lines);
        state.ring.iter().skip(start).cloned().collect()
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
