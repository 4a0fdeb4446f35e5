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

// Common test utilities and helpers for all test modules
#![allow(dead_code)]

use rowgate::core::models::JsonRpcResponse;
use rowgate::mcp::{Dispatcher, McpClient, McpServer};
use rowgate::store::{Filters, Row, RowStore, SelectQuery, StoreError};
use rowgate::tools::{TableAllowList, ToolRegistry};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const TEST_TABLES: [&str; 4] = ["packages", "bundles", "community_posts", "profiles"];

/// Spy row store: counts calls, echoes writes, can be slowed down per table.
#[derive(Default)]
pub struct SpyStore {
    pub calls: AtomicUsize,
    pub select_rows: Vec<Row>,
    pub delays: HashMap<String, Duration>,
    pub fail_with: Option<StoreError>,
    pub last_query: Mutex<Option<SelectQuery>>,
}

impl SpyStore {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, table: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(table) {
            tokio::time::sleep(*delay).await;
        }
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl RowStore for SpyStore {
    fn name(&self) -> &'static str {
        "spy"
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        self.enter(table).await?;
        *self.last_query.lock().unwrap() = Some(query.clone());
        Ok(self.select_rows.clone())
    }

    async fn insert(&self, table: &str, values: &Row) -> Result<Vec<Row>, StoreError> {
        self.enter(table).await?;
        Ok(vec![values.clone()])
    }

    async fn update(
        &self,
        table: &str,
        filters: &Filters,
        values: &Row,
    ) -> Result<Vec<Row>, StoreError> {
        self.enter(table).await?;
        let mut row = filters.clone();
        row.extend(values.clone());
        Ok(vec![row])
    }

    async fn delete(&self, table: &str, filters: &Filters) -> Result<Vec<Row>, StoreError> {
        self.enter(table).await?;
        Ok(vec![filters.clone()])
    }
}

pub fn dispatcher_with(store: Arc<dyn RowStore>, timeout: Duration) -> Dispatcher {
    let registry = ToolRegistry::new(TableAllowList::new(TEST_TABLES).unwrap());
    Dispatcher::new(registry, store, timeout)
}

/// A server running over in-memory pipes, and a client attached to it.
pub struct Harness {
    pub client: McpClient,
    pub server: JoinHandle<anyhow::Result<()>>,
}

pub fn start(dispatcher: Dispatcher) -> Harness {
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (client_read, client_write) = tokio::io::split(client_side);

    let server = tokio::spawn(async move {
        McpServer::new(dispatcher)
            .run(server_read, server_write)
            .await
    });
    Harness {
        client: McpClient::connect(client_read, client_write),
        server,
    }
}

pub fn error_code(resp: &JsonRpcResponse) -> i32 {
    resp.error.as_ref().expect("expected an error response").code
}

pub fn error_message(resp: &JsonRpcResponse) -> String {
    resp.error
        .as_ref()
        .expect("expected an error response")
        .message
        .clone()
}

/// Rows carried in a successful tool result's text content.
pub fn result_rows(resp: &JsonRpcResponse) -> Vec<Value> {
    let result = resp.result.as_ref().expect("expected a result");
    let text = result["content"][0]["text"]
        .as_str()
        .expect("expected text content");
    serde_json::from_str(text).expect("content text is a JSON array")
}
