// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP reachability probe.

use super::ProbeCtx;
use overseer_core::sensor::TCP;
use overseer_core::{Clock, SensorReading};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

pub struct TcpProbe {
    pub target: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl TcpProbe {
    pub async fn run<C: Clock>(self, ctx: ProbeCtx<C>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if ctx.sleep.is_suppressed() {
                continue;
            }
            let reading = self.probe_once(&ctx).await;
            ctx.send(reading);
        }
    }

    /// One connect attempt. A timeout is the deliberate offline signal;
    /// other failures (unreachable network, resolution) are carried as
    /// error readings so the policy can fall back to the IP sensors.
    pub async fn probe_once<C: Clock>(&self, ctx: &ProbeCtx<C>) -> SensorReading {
        let now = ctx.clock.epoch_ms();
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_stream)) => SensorReading::new(TCP, now)
                .with_online(true)
                .with_latency_ms(started.elapsed().as_millis() as u64),
            Ok(Err(e)) => SensorReading::new(TCP, now).with_error(e.to_string()),
            Err(_) => SensorReading::new(TCP, now)
                .with_online(false)
                .with_latency_ms(started.elapsed().as_millis() as u64),
        }
    }
}

#[cfg(test)]
#[path = "tcp_tests.rs"]
mod tests;
