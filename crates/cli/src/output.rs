// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable status rendering.

use overseer_wire::StatusReport;
use std::io::IsTerminal;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";

pub fn print_status(report: &StatusReport) {
    let color = std::io::stdout().is_terminal();
    let paint = |code: &str, text: &str| {
        if color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    };

    let online = if report.online {
        paint(GREEN, &format!("online (via {})", report.online_source))
    } else {
        paint(RED, "offline")
    };
    println!("{} {online}", paint(BOLD, "state:"));

    let named = |name: &str, display: &str| {
        if display.is_empty() || display == name {
            name.to_string()
        } else {
            format!("{name} ({display})")
        }
    };
    println!("context:  {}", named(&report.context, &report.context_display));
    if !report.location.is_empty() {
        println!("location: {}", named(&report.location, &report.location_display));
    }

    if let Some(ip) = &report.public_ipv4 {
        println!("public v4:  {ip}");
    }
    if let Some(ip) = &report.public_ipv6 {
        println!("public v6:  {ip}");
    }
    if let Some(ip) = &report.local_ipv4 {
        println!("local v4:   {ip}");
    }
    println!("uptime:     {}s", report.uptime_secs);

    if report.tunnels.is_empty() {
        return;
    }
    println!();
    println!("{}", paint(BOLD, "tunnels:"));
    for tunnel in &report.tunnels {
        let state = match tunnel.state.as_str() {
            "connected" => paint(GREEN, &tunnel.state),
            "backoff" | "connecting" => paint(YELLOW, &tunnel.state),
            "gave_up" => paint(RED, &tunnel.state),
            _ => tunnel.state.clone(),
        };
        let mut line = format!("  {:12} {state}", tunnel.alias);
        if tunnel.attempts > 0 {
            line.push_str(&format!(" (attempt {})", tunnel.attempts));
        }
        if let Some(error) = &tunnel.last_error {
            line.push_str(&format!(": {error}"));
        }
        println!("{line}");
    }
}
