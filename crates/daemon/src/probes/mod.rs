// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sensor probes: periodic tick loops that emit readings.
//!
//! Every probe checks the sleep monitor first and skips its iteration
//! while suppressed; probing through a suspended network stack is wasted
//! work at best. Probe failures become error readings, never log spam:
//! the policy and the rule engine treat them as data.

mod env;
mod local_ip;
mod public_ip;
mod tcp;

pub use env::env_readings;
pub use local_ip::{detect_local_ipv4, LocalIpProbe};
pub use public_ip::{mask_ipv6_prefix, PublicIpProbe};
pub use tcp::TcpProbe;

use crate::sleep::SleepMonitor;
use overseer_core::{Clock, SensorReading};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Shared probe wiring: the readings queue, the suppression predicate
/// and the root cancellation token.
#[derive(Clone)]
pub struct ProbeCtx<C: Clock> {
    pub readings: mpsc::Sender<SensorReading>,
    pub sleep: SleepMonitor,
    pub cancel: CancellationToken,
    pub clock: C,
}

impl<C: Clock> ProbeCtx<C> {
    /// Non-blocking send into the readings queue; drops with a warning
    /// on back-pressure. The next tick re-converges.
    pub fn send(&self, reading: SensorReading) {
        let sensor = reading.sensor.clone();
        if self.readings.try_send(reading).is_err() {
            tracing::warn!(sensor, "readings queue full, dropping probe reading");
        }
    }
}
