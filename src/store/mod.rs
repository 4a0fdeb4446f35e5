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

//! Row-store abstraction.
//!
//! The server reaches its database only through [`RowStore`]: equality-filtered
//! select/insert/update/delete against a single table. Backends are
//! [`postgrest::PostgrestStore`] (Supabase REST) and [`memory::MemoryStore`].

pub mod memory;
pub mod postgrest;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

/// One row, keyed by column name.
pub type Row = Map<String, Value>;

/// Column -> scalar equality filters, combined with AND.
pub type Filters = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    /// `None` selects every column.
    pub columns: Option<Vec<String>>,
    pub filters: Filters,
    pub order: Option<OrderBy>,
    pub limit: Option<u32>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store refused the operation (constraint violation, bad column, ...)
    #[error("{message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    /// The store could not be reached
    #[error("row store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something that is not a list of rows
    #[error("unexpected row store response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RowStore: Send + Sync {
    /// Short backend label for logs.
    fn name(&self) -> &'static str;

    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<Row>, StoreError>;

    /// Returns the inserted rows as stored.
    async fn insert(&self, table: &str, values: &Row) -> Result<Vec<Row>, StoreError>;

    /// Returns the rows after update.
    async fn update(
        &self,
        table: &str,
        filters: &Filters,
        values: &Row,
    ) -> Result<Vec<Row>, StoreError>;

    /// Returns the rows that were removed.
    async fn delete(&self, table: &str, filters: &Filters) -> Result<Vec<Row>, StoreError>;
}
