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

//! Supabase (PostgREST) row store.
//!
//! Translates [`RowStore`] calls into PostgREST requests against
//! `{project_url}/rest/v1/{table}`, authenticated with the service role key.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use super::{Filters, Row, RowStore, SelectQuery, StoreError};
use crate::core::errors::ServerError;

/// PostgREST error body.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

#[derive(Clone)]
pub struct PostgrestStore {
    client: Client,
    project_url: String,
    service_role_key: String,
}

impl PostgrestStore {
    pub fn new(
        project_url: &str,
        service_role_key: &str,
        timeout: Duration,
    ) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                ServerError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            project_url: project_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.project_url, table);
        self.client
            .request(method, url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
    }

    /// Send and decode a list of rows, mapping failures onto [`StoreError`].
    async fn execute(&self, request: RequestBuilder, table: &str) -> Result<Vec<Row>, StoreError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Unavailable(format!("request to table '{}' timed out", table))
            } else {
                StoreError::Unavailable(format!("request to table '{}' failed: {}", table, e))
            }
        })?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// PostgREST operator for an equality filter value.
fn eq_filter(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{}", s),
        other => format!("eq.{}", other),
    }
}

/// Filter keys are always double-quoted: a bare `order`, `select` or `or`
/// would be read by PostgREST as a control parameter, not a column.
/// Keys are validated identifiers, so they never contain a quote.
fn filter_params(filters: &Filters) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(col, val)| (format!("\"{}\"", col), eq_filter(val)))
        .collect()
}

fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
    let columns = query
        .columns
        .as_ref()
        .map(|cols| cols.join(","))
        .unwrap_or_else(|| "*".to_string());

    let mut params = vec![("select".to_string(), columns)];
    params.extend(filter_params(&query.filters));
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

async fn rejection(response: Response) -> StoreError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    error!("PostgREST error: {} - {}", status, text);

    let message = match serde_json::from_str::<PostgrestError>(&text) {
        Ok(body) => {
            let mut parts: Vec<String> = body.message.into_iter().collect();
            if let Some(details) = body.details.filter(|d| !d.is_empty()) {
                parts.push(format!("details: {}", details));
            }
            if let Some(hint) = body.hint.filter(|h| !h.is_empty()) {
                parts.push(format!("hint: {}", hint));
            }
            if parts.is_empty() {
                format!("HTTP {}", status)
            } else {
                parts.join("; ")
            }
        }
        Err(_) if text.is_empty() => format!("HTTP {}", status),
        Err(_) => format!("HTTP {}: {}", status, text),
    };

    StoreError::Rejected {
        status: Some(status.as_u16()),
        message,
    }
}

#[async_trait]
impl RowStore for PostgrestStore {
    fn name(&self) -> &'static str {
        "postgrest"
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError> {
        let params = select_params(query);
        debug!(table, ?params, "PostgREST select");
        let request = self.request(Method::GET, table).query(&params);
        self.execute(request, table).await
    }

    async fn insert(&self, table: &str, values: &Row) -> Result<Vec<Row>, StoreError> {
        debug!(table, "PostgREST insert");
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(values);
        self.execute(request, table).await
    }

    async fn update(
        &self,
        table: &str,
        filters: &Filters,
        values: &Row,
    ) -> Result<Vec<Row>, StoreError> {
        let params = filter_params(filters);
        debug!(table, ?params, "PostgREST update");
        let request = self
            .request(Method::PATCH, table)
            .query(&params)
            .header("Prefer", "return=representation")
            .json(values);
        self.execute(request, table).await
    }

    async fn delete(&self, table: &str, filters: &Filters) -> Result<Vec<Row>, StoreError> {
        let params = filter_params(filters);
        debug!(table, ?params, "PostgREST delete");
        let request = self
            .request(Method::DELETE, table)
            .query(&params)
            .header("Prefer", "return=representation");
        self.execute(request, table).await
    }
}
