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

//! Client side of the channel: pending-call correlation.
//!
//! Each request registers a oneshot continuation under its id before it is
//! written. The reader task resolves the continuation when the response with
//! that id arrives, in whatever order the server completes them. Responses
//! whose id matches no pending call (e.g. `id: null` parse errors) are
//! queued as unsolicited.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::core::constants::{jsonrpc, limits, methods};
use crate::core::models::{JsonRpcRequest, JsonRpcResponse};
use crate::mcp::codec::{Frame, LineCodec};

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>>;

// Value is not Hash; ids are keyed by their canonical JSON text.
fn id_key(id: &Value) -> String {
    id.to_string()
}

pub struct McpClient {
    outbound: mpsc::Sender<Value>,
    pending: PendingMap,
    next_id: AtomicU64,
    unsolicited: AsyncMutex<mpsc::UnboundedReceiver<JsonRpcResponse>>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

impl McpClient {
    /// Attach to a server through its input (`writer`) and output (`reader`).
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (outbound, mut rx_out) = mpsc::channel::<Value>(limits::CHANNEL_CAPACITY);
        let (tx_unsolicited, rx_unsolicited) = mpsc::unbounded_channel();

        let writer_task = tokio::spawn(async move {
            let mut framed = FramedWrite::new(writer, LineCodec::new());
            while let Some(message) = rx_out.recv().await {
                framed.send(&message).await?;
            }
            SinkExt::<&Value>::close(&mut framed).await?;
            Ok(())
        });

        let reader_pending = Arc::clone(&pending);
        let reader_task = tokio::spawn(async move {
            let mut framed = FramedRead::new(reader, LineCodec::new());
            while let Some(frame) = framed.next().await {
                let message = match frame {
                    Ok(Frame::Message(message)) => message,
                    Ok(Frame::Malformed(reason)) => {
                        warn!("Server sent an unparseable line: {}", reason);
                        continue;
                    }
                    Err(e) => {
                        warn!("Client read error: {}", e);
                        break;
                    }
                };
                let response: JsonRpcResponse = match serde_json::from_value(message) {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!("Server sent a non-response message: {}", e);
                        continue;
                    }
                };

                let waiter = reader_pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id_key(&response.id));
                match waiter {
                    Some(tx) => {
                        debug!(id = %response.id, "Correlated response");
                        let _ = tx.send(response);
                    }
                    None => {
                        let _ = tx_unsolicited.send(response);
                    }
                }
            }
            // Dropping the senders fails every outstanding call.
            reader_pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
        });

        Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            unsolicited: AsyncMutex::new(rx_unsolicited),
            reader_task,
            writer_task,
        }
    }

    /// Send a request with a fresh numeric id and wait for its response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.call_with_id(json!(id), method, params).await
    }

    /// Send a request under a caller-chosen id.
    pub async fn call_with_id(
        &self,
        id: Value,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        let key = id_key(&id);
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if pending.contains_key(&key) {
                return Err(anyhow!("Request id {} is already pending", key));
            }
            pending.insert(key.clone(), tx);
        }

        let request = JsonRpcRequest::new(id, method, params);
        if let Err(e) = self.send(serde_json::to_value(&request)?).await {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
            return Err(e);
        }

        rx.await
            .with_context(|| format!("Connection closed before response to id {}", key))
    }

    /// Convenience wrapper for `tools/call`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<JsonRpcResponse> {
        self.call(
            methods::TOOLS_CALL,
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    /// Send a notification (no id, no response).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let mut message = json!({ "jsonrpc": jsonrpc::VERSION, "method": method });
        if let Some(params) = params {
            message["params"] = params;
        }
        self.send(message).await
    }

    /// Write an arbitrary JSON value as one line.
    pub async fn send(&self, message: Value) -> Result<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| anyhow!("Client writer closed"))
    }

    /// Next response that matched no pending call.
    pub async fn next_unsolicited(&self) -> Option<JsonRpcResponse> {
        self.unsolicited.lock().await.recv().await
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Close the server's input and wait for the server to finish answering.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.outbound);
        self.writer_task
            .await
            .context("Client writer task failed")??;
        self.reader_task
            .await
            .context("Client reader task failed")?;
        Ok(())
    }
}
