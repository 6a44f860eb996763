// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! overseerd: the overseer daemon binary.

use overseer_daemon::lifecycle::{shutdown, startup};
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() {
    let Some(base) = overseer_config::base_dir() else {
        eprintln!("overseerd: cannot determine the home directory");
        std::process::exit(1);
    };

    let state = match startup(base, true).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("overseerd: {e}");
            std::process::exit(1);
        }
    };

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(e) => {
            eprintln!("overseerd: failed to install SIGINT handler: {e}");
            std::process::exit(1);
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            eprintln!("overseerd: failed to install SIGTERM handler: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }

    shutdown(state).await;
}
