// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MCP server main loop (Actor Model).
//!
//! - `DownstreamReader`: frames client input into events.
//! - `Writer`: sole owner of the output stream.
//! - `McpServer::run` (Main Loop): dispatches events in arrival order and
//!   runs deferred tool calls concurrently. Responses are correlated by id
//!   only; completion order is not preserved.

use anyhow::{anyhow, Context, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::core::constants::limits;
use crate::core::errors::ServerError;
use crate::core::models::JsonRpcResponse;
use crate::mcp::codec::LineCodec;
use crate::mcp::dispatcher::{Dispatcher, Outcome};
use crate::mcp::pipeline::{self, DownstreamEvent};

pub struct McpServer {
    dispatcher: Dispatcher,
    max_line_bytes: usize,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            max_line_bytes: limits::MAX_MESSAGE_SIZE_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serve one client until its input ends or Ctrl+C arrives.
    ///
    /// Returns `Ok(())` on end of input once every in-flight call has been
    /// answered. Returns an error only if the output becomes unwritable.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.run_until(reader, writer, tokio::signal::ctrl_c()).await
    }

    /// Like [`McpServer::run`], stopping early when `shutdown` resolves `Ok`.
    ///
    /// A `shutdown` that fails (no signal support) is logged and ignored;
    /// the server keeps serving until end of input.
    pub async fn run_until<R, W, S>(&self, reader: R, writer: W, shutdown: S) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = std::io::Result<()>>,
    {
        tokio::pin!(shutdown);
        let mut shutdown_armed = true;

        let (tx_events, mut rx_events) = mpsc::channel(limits::CHANNEL_CAPACITY);
        let (tx_out, rx_out) = mpsc::channel::<JsonRpcResponse>(limits::CHANNEL_CAPACITY);

        let reader_task = pipeline::spawn_downstream_reader(
            reader,
            LineCodec::with_max_length(self.max_line_bytes),
            tx_events,
        );
        let mut writer_task = pipeline::spawn_writer(writer, rx_out);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                // --- Handle Downstream (Client) Events ---
                event = rx_events.recv() => {
                    match event {
                        Some(DownstreamEvent::Message(message)) => {
                            match self.dispatcher.dispatch(message) {
                                Outcome::Reply(resp) => write(&tx_out, resp).await?,
                                Outcome::Deferred { id, call } => {
                                    let tx = tx_out.clone();
                                    in_flight.spawn(async move {
                                        let resp = match AssertUnwindSafe(call).catch_unwind().await {
                                            Ok(resp) => resp,
                                            Err(_) => {
                                                error!(%id, "Tool call panicked");
                                                ServerError::Internal("tool call failed unexpectedly".to_string())
                                                    .into_response(id)
                                            }
                                        };
                                        if tx.send(resp).await.is_err() {
                                            debug!("Writer gone, dropping response");
                                        }
                                    });
                                }
                                Outcome::Silent => {}
                            }
                        }
                        Some(DownstreamEvent::Malformed(reason)) => {
                            warn!("Parse error on input line: {}", reason);
                            write(&tx_out, JsonRpcResponse::parse_error()).await?;
                        }
                        Some(DownstreamEvent::Disconnect) | None => {
                            info!("Client disconnected. Shutting down.");
                            break;
                        }
                    }
                }

                // --- Reap finished tool calls ---
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Tool call task failed: {}", e);
                    }
                }

                // --- Output failure is fatal ---
                result = &mut writer_task => {
                    reader_task.abort();
                    return match result {
                        Ok(Ok(())) => Err(anyhow!("Output stream closed")),
                        Ok(Err(e)) => Err(e.context("Output stream unwritable")),
                        Err(e) => Err(anyhow!("Writer task failed: {}", e)),
                    };
                }

                // --- Signals ---
                signal = &mut shutdown, if shutdown_armed => match signal {
                    Ok(()) => {
                        info!("Received Ctrl+C, shutting down.");
                        break;
                    }
                    Err(e) => {
                        warn!("Signal handler unavailable, serving until end of input: {}", e);
                        shutdown_armed = false;
                    }
                },
            }
        }

        reader_task.abort();

        let pending = in_flight.len();
        if pending > 0 {
            info!(pending, "Waiting for in-flight tool calls");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Tool call task failed: {}", e);
            }
        }

        drop(tx_out);
        writer_task
            .await
            .context("Writer task failed")?
            .context("Output stream unwritable")?;
        Ok(())
    }
}

async fn write(tx: &mpsc::Sender<JsonRpcResponse>, resp: JsonRpcResponse) -> Result<()> {
    tx.send(resp)
        .await
        .map_err(|_| anyhow!("Output stream closed"))
}
