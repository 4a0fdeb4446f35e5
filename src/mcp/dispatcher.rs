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

//! JSON-RPC method dispatch.
//!
//! Everything up to the row-store call runs synchronously inside
//! [`Dispatcher::dispatch`]: request shape checks, method routing, rate
//! limiting, tool resolution, schema validation and the allow-list and
//! empty-filter gates. Only the row-store call itself is returned as a
//! future ([`Outcome::Deferred`]), so a request can suspend at exactly one
//! point.

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Map, Value};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::core::constants::{jsonrpc, methods, server};
use crate::core::errors::ServerError;
use crate::core::models::{JsonRpcRequest, JsonRpcResponse, ToolCallParams};
use crate::store::{Row, RowStore};
use crate::tools::{Operation, ToolRegistry};
use crate::utils::rate_limit::{RateDecision, RateLimitStore};

/// What the server loop should do with one incoming message.
pub enum Outcome {
    /// Answer immediately.
    Reply(JsonRpcResponse),
    /// Answer when the row-store call completes. The future never fails:
    /// errors are folded into the response.
    Deferred {
        id: Value,
        call: BoxFuture<'static, JsonRpcResponse>,
    },
    /// Notification: nothing to write.
    Silent,
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Reply(resp) => f.debug_tuple("Reply").field(resp).finish(),
            Outcome::Deferred { id, .. } => f.debug_struct("Deferred").field("id", id).finish(),
            Outcome::Silent => f.write_str("Silent"),
        }
    }
}

pub struct Dispatcher {
    registry: ToolRegistry,
    store: Arc<dyn RowStore>,
    call_timeout: Duration,
    rate_limiter: Option<Arc<dyn RateLimitStore>>,
    client_name: RwLock<String>,
}

/// Split a raw message into a request, or an error response keyed to
/// whatever id could be recovered.
fn parse_request(message: Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let Value::Object(obj) = message else {
        return Err(ServerError::InvalidRequest("expected a JSON object".to_string())
            .into_response(Value::Null));
    };

    let id = match obj.get("id") {
        None => None,
        Some(id @ (Value::Null | Value::Number(_) | Value::String(_))) => Some(id.clone()),
        Some(_) => {
            return Err(ServerError::InvalidRequest(
                "id must be a string, number or null".to_string(),
            )
            .into_response(Value::Null))
        }
    };
    let reply_id = id.clone().unwrap_or(Value::Null);

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(jsonrpc::VERSION) {
        return Err(
            ServerError::InvalidRequest("jsonrpc must be \"2.0\"".to_string())
                .into_response(reply_id),
        );
    }
    if !obj.get("method").is_some_and(Value::is_string) {
        return Err(
            ServerError::InvalidRequest("method must be a string".to_string())
                .into_response(reply_id),
        );
    }
    if obj
        .get("params")
        .is_some_and(|p| !(p.is_object() || p.is_array() || p.is_null()))
    {
        return Err(
            ServerError::InvalidRequest("params must be an object".to_string())
                .into_response(reply_id),
        );
    }

    serde_json::from_value::<JsonRpcRequest>(Value::Object(obj))
        .map_err(|e| ServerError::InvalidRequest(e.to_string()).into_response(reply_id))
}

fn tool_result(rows: &[Row]) -> Result<Value, ServerError> {
    let text = serde_json::to_string_pretty(rows)
        .map_err(|e| ServerError::Internal(format!("Failed to serialize rows: {}", e)))?;
    Ok(json!({
        "content": [{ "type": "text", "text": text }]
    }))
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, store: Arc<dyn RowStore>, call_timeout: Duration) -> Self {
        Self {
            registry,
            store,
            call_timeout,
            rate_limiter: None,
            client_name: RwLock::new(server::ANONYMOUS_CLIENT.to_string()),
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Client identity announced in `initialize`, used as the rate-limit key.
    pub fn client_name(&self) -> String {
        self.client_name
            .read()
            .map(|name| name.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn dispatch(&self, message: Value) -> Outcome {
        let req = match parse_request(message) {
            Ok(req) => req,
            Err(resp) => {
                warn!(id = %resp.id, "Invalid request: {:?}", resp.error);
                return Outcome::Reply(resp);
            }
        };

        let Some(id) = req.id.clone() else {
            self.handle_notification(&req);
            return Outcome::Silent;
        };

        debug!(method = %req.method, %id, "Dispatching request");
        match req.method.as_str() {
            methods::INITIALIZE => {
                self.record_client(req.params.as_ref());
                Outcome::Reply(JsonRpcResponse::success(
                    id,
                    json!({ "serverInfo": { "name": server::NAME, "version": server::VERSION } }),
                ))
            }
            methods::PING => Outcome::Reply(JsonRpcResponse::success(id, json!({}))),
            methods::TOOLS_LIST => {
                Outcome::Reply(JsonRpcResponse::success(id, self.registry.listing().clone()))
            }
            methods::TOOLS_CALL => match self.prepare_call(req.params) {
                Ok(op) => Outcome::Deferred {
                    call: self.execute(id.clone(), op),
                    id,
                },
                Err(e) => {
                    warn!(%id, error = %e, "Tool call rejected");
                    Outcome::Reply(e.into_response(id))
                }
            },
            other => {
                warn!(%id, method = other, "Unknown method");
                Outcome::Reply(ServerError::MethodNotFound(other.to_string()).into_response(id))
            }
        }
    }

    fn handle_notification(&self, req: &JsonRpcRequest) {
        match req.method.as_str() {
            methods::INITIALIZE => self.record_client(req.params.as_ref()),
            methods::TOOLS_CALL => warn!("Ignoring tools/call sent as a notification (no id)"),
            method => debug!(method, "Notification received"),
        }
    }

    fn record_client(&self, params: Option<&Value>) {
        let name = params
            .and_then(|p| p.pointer("/clientInfo/name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty());
        if let Some(name) = name {
            info!(client = name, "Client initialized");
            let mut guard = self.client_name.write().unwrap_or_else(|e| e.into_inner());
            *guard = name.to_string();
        }
    }

    /// MethodResolved -> ToolResolved -> Validated. No I/O.
    fn prepare_call(&self, params: Option<Value>) -> Result<Operation, ServerError> {
        if let Some(limiter) = &self.rate_limiter {
            let client = self.client_name();
            if let RateDecision::Limited { retry_after } =
                limiter.try_acquire(&client, Instant::now())
            {
                debug!(client = %client, ?retry_after, "Rate limited");
                return Err(ServerError::RateLimited(client));
            }
        }

        let params: ToolCallParams = match params {
            Some(p @ Value::Object(_)) => serde_json::from_value(p).map_err(|e| {
                ServerError::Validation(format!("tools/call params: {}", e))
            })?,
            _ => {
                return Err(ServerError::Validation(
                    "tools/call params must be an object with a \"name\"".to_string(),
                ))
            }
        };
        let arguments = params
            .arguments
            .unwrap_or_else(|| Value::Object(Map::new()));

        self.registry.prepare(&params.name, &arguments)
    }

    /// Validated -> Executed -> Responded. The row-store call is the only await.
    fn execute(&self, id: Value, op: Operation) -> BoxFuture<'static, JsonRpcResponse> {
        let store = Arc::clone(&self.store);
        let call_timeout = self.call_timeout;

        async move {
            let started = Instant::now();
            let outcome = tokio::time::timeout(call_timeout, op.execute(store.as_ref())).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(Ok(rows)) => {
                    info!(
                        op = op.verb(),
                        table = op.table(),
                        rows = rows.len(),
                        duration_ms = elapsed_ms,
                        "Tool call completed"
                    );
                    tool_result(&rows)
                }
                Ok(Err(e)) => {
                    error!(
                        op = op.verb(),
                        table = op.table(),
                        error = %e,
                        duration_ms = elapsed_ms,
                        "Row store rejected tool call"
                    );
                    Err(ServerError::Backend(e))
                }
                Err(_) => {
                    warn!(
                        op = op.verb(),
                        table = op.table(),
                        timeout_ms = call_timeout.as_millis() as u64,
                        "Row store call timed out"
                    );
                    Err(ServerError::Timeout(call_timeout.as_millis() as u64))
                }
            };

            match result {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => e.into_response(id),
            }
        }
        .boxed()
    }
}
