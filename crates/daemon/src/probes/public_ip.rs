// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public IP probes: plain-text HTTP resolvers for IPv4 and IPv6.
//!
//! Only the /64 prefix of an IPv6 address is surfaced; privacy
//! extensions churn the host bits constantly and exposing them would
//! make every probe a state change.

use super::ProbeCtx;
use overseer_core::sensor::{PUBLIC_IPV4, PUBLIC_IPV6};
use overseer_core::{Clock, SensorReading};
use std::net::{IpAddr, Ipv6Addr};
use std::time::{Duration, Instant};

pub struct PublicIpProbe {
    sensor: &'static str,
    resolver: String,
    interval: Duration,
    client: reqwest::Client,
}

impl PublicIpProbe {
    pub fn ipv4(resolver: String, interval: Duration) -> Self {
        Self::new(PUBLIC_IPV4, resolver, interval)
    }

    pub fn ipv6(resolver: String, interval: Duration) -> Self {
        Self::new(PUBLIC_IPV6, resolver, interval)
    }

    fn new(sensor: &'static str, resolver: String, interval: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { sensor, resolver, interval, client }
    }

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

    pub async fn probe_once<C: Clock>(&self, ctx: &ProbeCtx<C>) -> SensorReading {
        let now = ctx.clock.epoch_ms();
        let started = Instant::now();
        match self.fetch().await {
            Ok(ip) => {
                let ip = match ip {
                    IpAddr::V6(v6) => IpAddr::V6(mask_ipv6_prefix(v6)),
                    v4 => v4,
                };
                SensorReading::new(self.sensor, now)
                    .with_ip(ip)
                    .with_latency_ms(started.elapsed().as_millis() as u64)
            }
            Err(e) => SensorReading::new(self.sensor, now).with_error(e),
        }
    }

    async fn fetch(&self) -> Result<IpAddr, String> {
        let response = self
            .client
            .get(&self.resolver)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let body = response.text().await.map_err(|e| e.to_string())?;
        let text = body.trim();
        let ip: IpAddr = text
            .parse()
            .map_err(|_| format!("resolver returned a non-address: {text:.64}"))?;

        let family_ok = match self.sensor {
            s if s == PUBLIC_IPV4 => ip.is_ipv4(),
            _ => ip.is_ipv6(),
        };
        if !family_ok {
            return Err(format!("resolver returned the wrong family: {ip}"));
        }
        Ok(ip)
    }
}

/// Zero the host bits below /64.
pub fn mask_ipv6_prefix(addr: Ipv6Addr) -> Ipv6Addr {
    let s = addr.segments();
    Ipv6Addr::new(s[0], s[1], s[2], s[3], 0, 0, 0, 0)
}

#[cfg(test)]
#[path = "public_ip_tests.rs"]
mod tests;
