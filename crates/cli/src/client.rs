// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket client helpers.

use anyhow::{Context, Result};
use overseer_wire::{decode, encode, read_message, write_message, Request, Response};
use std::path::Path;
use tokio::net::UnixStream;

pub async fn connect(socket: &Path) -> Result<UnixStream> {
    UnixStream::connect(socket)
        .await
        .with_context(|| format!("cannot reach the daemon at {} (is it running?)", socket.display()))
}

/// One request, one response.
pub async fn roundtrip(socket: &Path, request: &Request) -> Result<Response> {
    let mut stream = connect(socket).await?;
    let payload = encode(request)?;
    write_message(&mut stream, &payload).await?;
    let frame = read_message(&mut stream).await.context("daemon closed the connection")?;
    Ok(decode(&frame)?)
}

/// Stream rendered log lines to stdout until interrupted.
pub async fn stream_logs(socket: &Path, replay: bool, lines: usize) -> Result<()> {
    let mut stream = connect(socket).await?;
    let payload = encode(&Request::LogsStream { replay, lines })?;
    write_message(&mut stream, &payload).await?;

    loop {
        let frame = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            frame = read_message(&mut stream) => match frame {
                Ok(frame) => frame,
                Err(_) => break,
            },
        };
        match decode::<Response>(&frame)? {
            Response::Log { line } => println!("{line}"),
            Response::Error { message } => anyhow::bail!("{message}"),
            _ => break,
        }
    }
    Ok(())
}
