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

mod common;

use common::*;
use rowgate::core::constants::jsonrpc;
use rowgate::mcp::McpServer;
use rowgate::store::{MemoryStore, StoreError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_disallowed_table_never_reaches_store() {
    let spy = Arc::new(SpyStore::default());
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));

    let resp = h
        .client
        .call_with_id(
            json!(2),
            "tools/call",
            Some(json!({"name": "supabase_select", "arguments": {"table": "not_a_real_table", "columns": ["id"]}})),
        )
        .await
        .unwrap();

    assert_eq!(resp.id, json!(2));
    assert_eq!(error_code(&resp), jsonrpc::ERROR_FORBIDDEN);
    assert_eq!(error_message(&resp), "Table not allowed: not_a_real_table");
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn test_insert_echoes_row() {
    let spy = Arc::new(SpyStore::default());
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));

    let resp = h
        .client
        .call_with_id(
            json!(3),
            "tools/call",
            Some(json!({"name": "supabase_insert", "arguments": {"table": "packages", "values": {"name": "X", "user_id": "u1"}}})),
        )
        .await
        .unwrap();

    assert_eq!(resp.id, json!(3));
    let rows = result_rows(&resp);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "X");
    assert_eq!(rows[0]["user_id"], "u1");
    assert_eq!(resp.result.unwrap()["content"][0]["type"], "text");
    assert_eq!(spy.call_count(), 1);
}

#[tokio::test]
async fn test_delete_with_empty_where_is_refused() {
    let spy = Arc::new(SpyStore::default());
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));

    let resp = h
        .client
        .call_with_id(
            json!(5),
            "tools/call",
            Some(json!({"name": "supabase_delete", "arguments": {"table": "community_posts", "where": {}}})),
        )
        .await
        .unwrap();

    assert_eq!(resp.id, json!(5));
    assert_eq!(error_code(&resp), jsonrpc::ERROR_FORBIDDEN);
    assert_eq!(error_message(&resp), "Refusing to delete without a where filter");
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn test_update_with_empty_where_is_refused() {
    let spy = Arc::new(SpyStore::default());
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));

    let resp = h
        .client
        .call_tool(
            "supabase_update",
            json!({"table": "packages", "where": {}, "values": {"name": "Y"}}),
        )
        .await
        .unwrap();

    assert_eq!(error_message(&resp), "Refusing to update without a where filter");
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn test_validation_runs_before_allow_list() {
    let spy = Arc::new(SpyStore::default());
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));

    // Bad limit on a forbidden table: the schema error wins.
    let resp = h
        .client
        .call_tool("supabase_select", json!({"table": "secrets", "limit": 0}))
        .await
        .unwrap();
    assert_eq!(error_code(&resp), jsonrpc::ERROR_INVALID_PARAMS);

    // Forbidden table with an empty filter: the allow-list wins.
    let resp = h
        .client
        .call_tool("supabase_delete", json!({"table": "secrets", "where": {}}))
        .await
        .unwrap();
    assert_eq!(error_message(&resp), "Table not allowed: secrets");
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn test_select_limit_bounds() {
    let spy = Arc::new(SpyStore::default());
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));

    let resp = h
        .client
        .call_tool("supabase_select", json!({"table": "packages", "limit": 500}))
        .await
        .unwrap();
    assert_eq!(error_code(&resp), jsonrpc::ERROR_INVALID_PARAMS);
    assert!(error_message(&resp).contains("limit"));
    assert_eq!(spy.call_count(), 0);

    let resp = h
        .client
        .call_tool("supabase_select", json!({"table": "packages", "limit": 2.5}))
        .await
        .unwrap();
    assert_eq!(error_code(&resp), jsonrpc::ERROR_INVALID_PARAMS);
    assert_eq!(spy.call_count(), 0);

    let resp = h
        .client
        .call_tool("supabase_select", json!({"table": "packages", "limit": 200}))
        .await
        .unwrap();
    assert!(!resp.is_error());
    assert_eq!(spy.last_query.lock().unwrap().as_ref().unwrap().limit, Some(200));

    let resp = h
        .client
        .call_tool(
            "supabase_select",
            json!({"table": "packages", "where": {"user_id": "u1"}, "orderBy": "created_at", "ascending": false}),
        )
        .await
        .unwrap();
    assert!(!resp.is_error());
    let query = spy.last_query.lock().unwrap().clone().unwrap();
    assert_eq!(query.limit, None);
    assert_eq!(query.filters.get("user_id"), Some(&json!("u1")));
    let order = query.order.unwrap();
    assert_eq!(order.column, "created_at");
    assert!(!order.ascending);
    assert_eq!(spy.call_count(), 2);
}

#[tokio::test]
async fn test_unknown_tool_and_method() {
    let spy = Arc::new(SpyStore::default());
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));

    let resp = h
        .client
        .call_tool("supabase_truncate", json!({"table": "packages"}))
        .await
        .unwrap();
    assert_eq!(error_code(&resp), jsonrpc::ERROR_UNKNOWN_TOOL);
    assert_eq!(error_message(&resp), "Unknown tool: supabase_truncate");

    let resp = h.client.call("prompts/list", None).await.unwrap();
    assert_eq!(error_code(&resp), jsonrpc::ERROR_METHOD_NOT_FOUND);
    assert_eq!(spy.call_count(), 0);
}

#[tokio::test]
async fn test_listing_is_byte_identical() {
    let h = start(dispatcher_with(Arc::new(SpyStore::default()), TIMEOUT));

    let first = h.client.call("tools/list", None).await.unwrap();
    let second = h.client.call("tools/list", Some(json!({}))).await.unwrap();
    let first = serde_json::to_string(&first.result).unwrap();
    let second = serde_json::to_string(&second.result).unwrap();
    assert_eq!(first, second);

    let listing: Value = serde_json::from_str(&first).unwrap();
    let names: Vec<&str> = listing["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["supabase_select", "supabase_insert", "supabase_update", "supabase_delete"]
    );
    assert_eq!(
        listing["tools"][0]["input_schema"]["additionalProperties"],
        json!(false)
    );
}

#[tokio::test]
async fn test_concurrent_calls_complete_out_of_order() {
    let spy = Arc::new(SpyStore {
        delays: HashMap::from([("bundles".to_string(), Duration::from_millis(300))]),
        ..SpyStore::default()
    });
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));
    let client = Arc::new(h.client);

    let slow = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            let resp = client
                .call_with_id(
                    json!("slow"),
                    "tools/call",
                    Some(json!({"name": "supabase_insert", "arguments": {"table": "bundles", "values": {"name": "slow"}}})),
                )
                .await
                .unwrap();
            (resp, tokio::time::Instant::now())
        })
    };
    // Let the slow request reach the server first.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fast = client
        .call_with_id(
            json!("fast"),
            "tools/call",
            Some(json!({"name": "supabase_insert", "arguments": {"table": "packages", "values": {"name": "fast"}}})),
        )
        .await
        .unwrap();
    let fast_done = tokio::time::Instant::now();

    let (slow, slow_done) = slow.await.unwrap();
    assert_eq!(fast.id, json!("fast"));
    assert_eq!(result_rows(&fast)[0]["name"], "fast");
    assert_eq!(slow.id, json!("slow"));
    assert_eq!(result_rows(&slow)[0]["name"], "slow");
    assert!(fast_done < slow_done);
    assert_eq!(spy.call_count(), 2);
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let spy = Arc::new(SpyStore {
        delays: HashMap::from([("packages".to_string(), Duration::from_secs(10))]),
        ..SpyStore::default()
    });
    let h = start(dispatcher_with(spy.clone(), Duration::from_millis(50)));

    let resp = h
        .client
        .call_tool("supabase_select", json!({"table": "packages"}))
        .await
        .unwrap();
    assert_eq!(error_code(&resp), jsonrpc::ERROR_TIMEOUT);
    assert_eq!(error_message(&resp), "Backend call timed out after 50 ms");

    // The server keeps serving after a timeout.
    let resp = h.client.call("ping", None).await.unwrap();
    assert_eq!(resp.result, Some(json!({})));
}

#[tokio::test]
async fn test_store_failure_is_reported_verbatim() {
    let spy = Arc::new(SpyStore {
        fail_with: Some(StoreError::Rejected {
            status: Some(409),
            message: "duplicate key value violates unique constraint \"packages_pkey\"".into(),
        }),
        ..SpyStore::default()
    });
    let h = start(dispatcher_with(spy.clone(), TIMEOUT));

    let resp = h
        .client
        .call_tool("supabase_insert", json!({"table": "packages", "values": {"id": 1}}))
        .await
        .unwrap();
    assert_eq!(error_code(&resp), jsonrpc::ERROR_BACKEND);
    assert!(error_message(&resp).contains("packages_pkey"));
    assert_eq!(spy.call_count(), 1);
}

#[tokio::test]
async fn test_memory_store_round_trip_through_server() {
    let h = start(dispatcher_with(Arc::new(MemoryStore::new()), TIMEOUT));
    let c = &h.client;

    c.call_tool("supabase_insert", json!({"table": "profiles", "values": {"handle": "ada", "karma": 3}}))
        .await
        .unwrap();
    c.call_tool("supabase_insert", json!({"table": "profiles", "values": {"handle": "bob", "karma": 1}}))
        .await
        .unwrap();

    let updated = c
        .call_tool(
            "supabase_update",
            json!({"table": "profiles", "where": {"handle": "bob"}, "values": {"karma": 9}}),
        )
        .await
        .unwrap();
    assert_eq!(result_rows(&updated)[0]["karma"], 9);

    let selected = c
        .call_tool(
            "supabase_select",
            json!({"table": "profiles", "columns": ["handle"], "orderBy": "karma", "ascending": false, "limit": 1}),
        )
        .await
        .unwrap();
    assert_eq!(result_rows(&selected), vec![json!({"handle": "bob"})]);

    let deleted = c
        .call_tool("supabase_delete", json!({"table": "profiles", "where": {"handle": "ada"}}))
        .await
        .unwrap();
    assert_eq!(result_rows(&deleted).len(), 1);

    let rest = c
        .call_tool("supabase_select", json!({"table": "profiles"}))
        .await
        .unwrap();
    assert_eq!(result_rows(&rest).len(), 1);
}

#[tokio::test]
async fn test_notification_gets_no_response() {
    let h = start(dispatcher_with(Arc::new(SpyStore::default()), TIMEOUT));

    h.client
        .notify("notifications/initialized", None)
        .await
        .unwrap();
    let resp = h.client.call("ping", None).await.unwrap();
    assert_eq!(resp.id, json!(1));
    assert_eq!(h.client.pending_count(), 0);

    h.client.shutdown().await.unwrap();
    h.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_parse_error_then_recovery_over_split_chunks() {
    let (client_side, server_side) = tokio::io::duplex(1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let server = tokio::spawn(async move {
        McpServer::new(dispatcher_with(Arc::new(SpyStore::default()), TIMEOUT))
            .run(server_read, server_write)
            .await
    });

    let (client_read, mut client_write) = tokio::io::split(client_side);
    let mut lines = BufReader::new(client_read).lines();

    client_write.write_all(b"not json at all\n{\"jsonrpc\":\"2.0\",").await.unwrap();
    client_write.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    client_write
        .write_all(b"\"id\":1,\"method\":\"initialize\",\"params\":{}}\n")
        .await
        .unwrap();

    let first = lines.next_line().await.unwrap().unwrap();
    assert_eq!(
        first,
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#
    );
    let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(second["id"], json!(1));
    assert_eq!(second["result"]["serverInfo"]["name"], "rowgate");

    client_write.shutdown().await.unwrap();
    assert_eq!(lines.next_line().await.unwrap(), None);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_eof_waits_for_in_flight_calls() {
    let spy = Arc::new(SpyStore {
        delays: HashMap::from([("packages".to_string(), Duration::from_millis(100))]),
        ..SpyStore::default()
    });
    let (client_side, server_side) = tokio::io::duplex(4096);
    let (server_read, server_write) = tokio::io::split(server_side);
    let server = tokio::spawn(async move {
        McpServer::new(dispatcher_with(spy, TIMEOUT))
            .run(server_read, server_write)
            .await
    });

    let (client_read, mut client_write) = tokio::io::split(client_side);
    client_write
        .write_all(
            b"{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"tools/call\",\"params\":{\"name\":\"supabase_insert\",\"arguments\":{\"table\":\"packages\",\"values\":{\"name\":\"late\"}}}}\n",
        )
        .await
        .unwrap();
    client_write.shutdown().await.unwrap();

    let mut lines = BufReader::new(client_read).lines();
    let line: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(line["id"], json!(7));
    assert_eq!(lines.next_line().await.unwrap(), None);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unavailable_signal_handler_keeps_serving() {
    let (client_side, server_side) = tokio::io::duplex(4096);
    let (server_read, server_write) = tokio::io::split(server_side);
    let server = tokio::spawn(async move {
        McpServer::new(dispatcher_with(Arc::new(SpyStore::default()), TIMEOUT))
            .run_until(server_read, server_write, async {
                Err(std::io::Error::other("no signal support"))
            })
            .await
    });

    let (client_read, mut client_write) = tokio::io::split(client_side);
    let mut lines = BufReader::new(client_read).lines();

    // Give the failed handler a chance to resolve before any input.
    tokio::task::yield_now().await;
    client_write
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
        .await
        .unwrap();
    assert_eq!(
        lines.next_line().await.unwrap().as_deref(),
        Some(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
    );

    client_write.shutdown().await.unwrap();
    assert_eq!(lines.next_line().await.unwrap(), None);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_signal_stops_open_session() {
    let (client_side, server_side) = tokio::io::duplex(4096);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (client_read, _client_write) = tokio::io::split(client_side);

    let result = tokio::time::timeout(
        TIMEOUT,
        McpServer::new(dispatcher_with(Arc::new(SpyStore::default()), TIMEOUT)).run_until(
            server_read,
            server_write,
            async { Ok(()) },
        ),
    )
    .await
    .expect("server stops without waiting for end of input");
    result.unwrap();

    let mut lines = BufReader::new(client_read).lines();
    assert_eq!(lines.next_line().await.unwrap(), None);
}
