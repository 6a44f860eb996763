// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket listener for CLI requests.
//!
//! Each accepted connection is served by its own task so a slow log
//! subscriber never blocks the accept loop or the daemon.

use crate::logstream::render;
use crate::orchestrator::Orchestrator;
use overseer_wire::{decode, encode, read_message, write_message, Request, Response};
use overseer_wire::{StatusReport, TunnelStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared context for all request handlers.
pub struct ListenCtx {
    pub orchestrator: Arc<Orchestrator>,
    pub config_path: PathBuf,
    pub start_time: Instant,
    pub cancel: CancellationToken,
}

pub struct Listener {
    listener: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(listener: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { listener, ctx }
    }

    /// Accept connections until shutdown.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.ctx.cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(handle_connection(stream, ctx));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
        debug!("listener stopped");
    }
}

async fn handle_connection(mut stream: UnixStream, ctx: Arc<ListenCtx>) {
    let frame = match read_message(&mut stream).await {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "dropping connection with unreadable frame");
            return;
        }
    };
    let request: Request = match decode(&frame) {
        Ok(request) => request,
        Err(e) => {
            let _ = send(&mut stream, &Response::error(format!("bad request: {e}"))).await;
            return;
        }
    };

    match request {
        Request::LogsStream { replay, lines } => stream_logs(stream, ctx, replay, lines).await,
        request => {
            let response = dispatch(&ctx, request);
            let _ = send(&mut stream, &response).await;
        }
    }
}

fn dispatch(ctx: &ListenCtx, request: Request) -> Response {
    match request {
        Request::Status => Response::Status(status_report(ctx)),
        Request::Connect { alias } => {
            ctx.orchestrator.connect(&alias);
            Response::Ok
        }
        Request::Disconnect { alias } => {
            ctx.orchestrator.disconnect(alias.as_deref());
            Response::Ok
        }
        Request::Reconnect { alias } => {
            ctx.orchestrator.reconnect(&alias);
            Response::Ok
        }
        Request::Reload => match ctx.orchestrator.reload_from_disk(&ctx.config_path) {
            Ok(()) => Response::Ok,
            Err(message) => Response::error(message),
        },
        Request::Reset => {
            ctx.orchestrator.reset();
            Response::Ok
        }
        Request::Askpass { alias, token } => match ctx.orchestrator.askpass(&alias, &token) {
            Ok(password) => Response::Askpass { password },
            Err(message) => Response::error(message),
        },
        Request::LogsStream { .. } => Response::error("logs_stream is handled upstream"),
    }
}

fn status_report(ctx: &ListenCtx) -> StatusReport {
    let snapshot = ctx.orchestrator.snapshot();
    let tunnels = ctx
        .orchestrator
        .tunnel_infos()
        .into_iter()
        .map(|info| TunnelStatus {
            alias: info.alias,
            state: info.state.as_str().to_string(),
            attempts: info.attempts,
            last_error: info.last_error,
            connected_since_ms: info.connected_since_ms,
            next_attempt_ms: info.next_attempt_ms,
        })
        .collect();

    StatusReport {
        online: snapshot.online,
        online_source: snapshot.online_source.clone(),
        context: snapshot.context.clone(),
        context_display: snapshot.context_display.clone(),
        location: snapshot.location.clone(),
        location_display: snapshot.location_display.clone(),
        public_ipv4: snapshot.public_ipv4.map(|ip| ip.to_string()),
        public_ipv6: snapshot.public_ipv6.map(|ip| ip.to_string()),
        local_ipv4: snapshot.local_ipv4.map(|ip| ip.to_string()),
        uptime_secs: ctx.start_time.elapsed().as_secs(),
        tunnels,
    }
}

/// Stream rendered log lines until the client hangs up or the daemon
/// stops.
async fn stream_logs(mut stream: UnixStream, ctx: Arc<ListenCtx>, replay: bool, lines: usize) {
    let streamer = ctx.orchestrator.streamer().clone();
    let (id, mut rx) = streamer.subscribe(replay, lines);

    loop {
        let entry = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            entry = rx.recv() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };
        let response = Response::Log { line: render(&entry, false) };
        if send(&mut stream, &response).await.is_err() {
            break;
        }
    }

    streamer.unsubscribe(id);
}

async fn send(stream: &mut UnixStream, response: &Response) -> Result<(), ()> {
    let payload = encode(response).map_err(|_| ())?;
    write_message(stream, &payload).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
