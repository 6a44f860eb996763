// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Askpass helper mode.
//!
//! SSH invokes `$SSH_ASKPASS <prompt>`; the brokering variables exported
//! by the daemon identify the tunnel and carry the one-time token. The
//! helper fetches the password over the IPC socket and writes it to
//! stdout, which is all SSH expects.

use crate::client;
use anyhow::{bail, Result};
use overseer_wire::{Request, Response};

pub struct Broker {
    pub alias: String,
    pub token: String,
}

/// Present when the daemon spawned our parent SSH process.
pub fn from_env() -> Option<Broker> {
    let alias = std::env::var("OVERSEER_ASKPASS_ALIAS").ok()?;
    let token = std::env::var("OVERSEER_ASKPASS_TOKEN").ok()?;
    if alias.is_empty() || token.is_empty() {
        return None;
    }
    Some(Broker { alias, token })
}

pub async fn run(broker: Broker) -> Result<()> {
    let Some(base) = overseer_config::base_dir() else {
        bail!("cannot determine the home directory");
    };
    let socket = base.join("daemon.sock");

    let response = client::roundtrip(
        &socket,
        &Request::Askpass { alias: broker.alias, token: broker.token },
    )
    .await?;

    match response {
        Response::Askpass { password } => {
            println!("{password}");
            Ok(())
        }
        Response::Error { message } => bail!("askpass rejected: {message}"),
        other => bail!("unexpected response: {other:?}"),
    }
}
