// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! overseer: CLI frontend for the overseer daemon.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod askpass;
mod client;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use overseer_wire::{Request, Response};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "overseer", about = "Network-context tunnel manager", version)]
struct Cli {
    /// Base directory (defaults to ~/.config/overseer)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current state and tunnels
    Status,
    /// Bring a tunnel up
    Connect { alias: String },
    /// Bring a tunnel down (all tunnels when no alias is given)
    Disconnect { alias: Option<String> },
    /// Force a reconnect cycle for a tunnel
    Reconnect { alias: String },
    /// Re-read the configuration file
    Reload,
    /// Clear retry counters and force a state re-evaluation
    Reset,
    /// Stream daemon logs
    Logs {
        /// Number of recent entries to replay first
        #[arg(long, default_value_t = 50)]
        lines: usize,
        /// Skip the replay and show only new entries
        #[arg(long)]
        no_replay: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // When SSH re-invokes us as the askpass helper, the brokering env
    // vars are present and the regular CLI surface does not apply.
    if let Some(broker) = askpass::from_env() {
        return askpass::run(broker).await;
    }

    let cli = Cli::parse();
    let base = match cli.base_dir {
        Some(base) => base,
        None => overseer_config::base_dir().context("cannot determine the home directory")?,
    };
    let socket = base.join("daemon.sock");

    match cli.command {
        Command::Status => {
            let response = client::roundtrip(&socket, &Request::Status).await?;
            match response {
                Response::Status(report) => output::print_status(&report),
                other => bail!("unexpected response: {other:?}"),
            }
        }
        Command::Connect { alias } => {
            expect_ok(client::roundtrip(&socket, &Request::Connect { alias }).await?)?;
        }
        Command::Disconnect { alias } => {
            expect_ok(client::roundtrip(&socket, &Request::Disconnect { alias }).await?)?;
        }
        Command::Reconnect { alias } => {
            expect_ok(client::roundtrip(&socket, &Request::Reconnect { alias }).await?)?;
        }
        Command::Reload => {
            expect_ok(client::roundtrip(&socket, &Request::Reload).await?)?;
            println!("configuration reloaded");
        }
        Command::Reset => {
            expect_ok(client::roundtrip(&socket, &Request::Reset).await?)?;
        }
        Command::Logs { lines, no_replay } => {
            client::stream_logs(&socket, !no_replay, lines).await?;
        }
    }
    Ok(())
}

fn expect_ok(response: Response) -> Result<()> {
    match response {
        Response::Ok => Ok(()),
        Response::Error { message } => bail!("{message}"),
        other => bail!("unexpected response: {other:?}"),
    }
}
