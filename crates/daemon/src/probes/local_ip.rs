// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local IPv4 probe: the LAN address of the preferred default-route
//! interface, via the connected-UDP-socket trick (no packet is sent).

use super::ProbeCtx;
use overseer_core::sensor::LOCAL_IPV4;
use overseer_core::{Clock, SensorReading};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

pub struct LocalIpProbe {
    pub interval: Duration,
    /// Address the socket is "connected" to; routing decides the local
    /// interface, nothing is transmitted.
    pub probe_target: String,
}

impl LocalIpProbe {
    pub fn new(interval: Duration) -> Self {
        Self { interval, probe_target: "1.1.1.1:80".to_string() }
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
            let now = ctx.clock.epoch_ms();
            let reading = match detect_local_ipv4(&self.probe_target) {
                Ok(ip) => SensorReading::new(LOCAL_IPV4, now).with_ip(ip.into()),
                Err(e) => SensorReading::new(LOCAL_IPV4, now).with_error(e.to_string()),
            };
            ctx.send(reading);
        }
    }
}

/// Which local IPv4 the kernel would route towards `target`.
pub fn detect_local_ipv4(target: &str) -> std::io::Result<Ipv4Addr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(target)?;
    match socket.local_addr()? {
        SocketAddr::V4(addr) => Ok(*addr.ip()),
        SocketAddr::V6(addr) => Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("expected an IPv4 local address, got {addr}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_local_ipv4_against_loopback() {
        // Loopback routing always resolves, even on hosts with no
        // default route.
        let ip = detect_local_ipv4("127.0.0.1:80").unwrap();
        assert!(ip.is_loopback());
    }

    #[test]
    fn unparseable_target_errors() {
        assert!(detect_local_ipv4("not a target").is_err());
    }
}
