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

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error};

use crate::core::models::JsonRpcResponse;
use crate::mcp::codec::{Frame, LineCodec};

/// Messages arriving from the Downstream Client (the Agent)
#[derive(Debug)]
pub enum DownstreamEvent {
    /// One complete, syntactically valid JSON line
    Message(Value),
    /// A line that could not be parsed
    Malformed(String),
    /// Client closed its end (EOF) or the read side failed
    Disconnect,
}

/// Spawns a background task that frames the client stream into events.
pub fn spawn_downstream_reader<R>(
    stream: R,
    codec: LineCodec,
    tx: mpsc::Sender<DownstreamEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, codec);

        while let Some(result) = framed.next().await {
            let event = match result {
                Ok(Frame::Message(val)) => DownstreamEvent::Message(val),
                Ok(Frame::Malformed(reason)) => DownstreamEvent::Malformed(reason),
                Err(e) => {
                    // Only I/O failures surface here; framing errors are frames.
                    error!("Downstream read error: {}", e);
                    break;
                }
            };
            if tx.send(event).await.is_err() {
                return;
            }
        }
        let _ = tx.send(DownstreamEvent::Disconnect).await;
    })
}

/// Spawns the single writer task that owns the client output.
///
/// Every response goes through this one task, one complete line at a time,
/// so handlers finishing concurrently can never interleave partial lines.
/// The task ends when all senders are dropped, or with an error if the
/// output becomes unwritable.
pub fn spawn_writer<W>(
    stream: W,
    mut rx: mpsc::Receiver<JsonRpcResponse>,
) -> JoinHandle<anyhow::Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedWrite::new(stream, LineCodec::new());
        while let Some(response) = rx.recv().await {
            debug!(id = %response.id, error = response.is_error(), "Writing response");
            // `send` flushes after each item.
            framed.send(&response).await?;
        }
        // The codec encodes any `Serialize`, so the sink item must be named.
        SinkExt::<&JsonRpcResponse>::close(&mut framed).await?;
        Ok(())
    })
}
