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

//! Tool catalog and query translation.
//!
//! `prepare` runs the gates in a fixed order:
//! 1. schema validation of `arguments`,
//! 2. table allow-list,
//! 3. non-empty `where` for update/delete.
//!
//! Only a fully gated [`Operation`] can reach the row store.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::constants::{limits, tools};
use crate::core::errors::ServerError;
use crate::core::models::ToolDescriptor;
use crate::store::{Filters, OrderBy, Row, RowStore, SelectQuery, StoreError};
use crate::tools::allowlist::TableAllowList;
use crate::tools::schema::{Kind, ObjectSchema, Property};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ToolKind,
    pub schema: ObjectSchema,
}

impl ToolDefinition {
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name,
            description: self.description,
            input_schema: self.schema.to_json_schema(),
        }
    }
}

const TABLE_DESC: &str = "Table to operate on. Must be on the server's allow-list.";

fn catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: tools::SELECT,
            description: "Select rows from a table. Filters in `where` are combined with AND \
                          using equality only.",
            kind: ToolKind::Select,
            schema: ObjectSchema::new(vec![
                Property::required("table", Kind::String, TABLE_DESC),
                Property::optional(
                    "columns",
                    Kind::IdentifierList,
                    "Columns to return. Defaults to all columns.",
                ),
                Property::optional(
                    "where",
                    Kind::ScalarMap { min_properties: 0 },
                    "Column -> value equality filters, combined with AND.",
                ),
                Property::optional("orderBy", Kind::Identifier, "Column to sort by."),
                Property::optional(
                    "ascending",
                    Kind::Boolean,
                    "Sort direction for orderBy. Defaults to true.",
                ),
                Property::optional(
                    "limit",
                    Kind::Integer {
                        min: limits::SELECT_LIMIT_MIN,
                        max: limits::SELECT_LIMIT_MAX,
                    },
                    "Maximum number of rows to return.",
                ),
            ]),
        },
        ToolDefinition {
            name: tools::INSERT,
            description: "Insert one row into a table and return it as stored.",
            kind: ToolKind::Insert,
            schema: ObjectSchema::new(vec![
                Property::required("table", Kind::String, TABLE_DESC),
                Property::required(
                    "values",
                    Kind::ScalarMap { min_properties: 1 },
                    "Column -> value pairs for the new row.",
                ),
            ]),
        },
        ToolDefinition {
            name: tools::UPDATE,
            description: "Update rows matching every equality filter in `where` and return \
                          the updated rows. An empty `where` is refused.",
            kind: ToolKind::Update,
            schema: ObjectSchema::new(vec![
                Property::required("table", Kind::String, TABLE_DESC),
                Property::required(
                    "where",
                    Kind::ScalarMap { min_properties: 0 },
                    "Column -> value equality filters, combined with AND. Must not be empty.",
                ),
                Property::required(
                    "values",
                    Kind::ScalarMap { min_properties: 1 },
                    "Column -> new value pairs.",
                ),
            ]),
        },
        ToolDefinition {
            name: tools::DELETE,
            description: "Delete rows matching every equality filter in `where` and return \
                          the deleted rows. An empty `where` is refused.",
            kind: ToolKind::Delete,
            schema: ObjectSchema::new(vec![
                Property::required("table", Kind::String, TABLE_DESC),
                Property::required(
                    "where",
                    Kind::ScalarMap { min_properties: 0 },
                    "Column -> value equality filters, combined with AND. Must not be empty.",
                ),
            ]),
        },
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectArgs {
    table: String,
    columns: Option<Vec<String>>,
    #[serde(rename = "where", default)]
    filters: Filters,
    order_by: Option<String>,
    ascending: Option<bool>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct InsertArgs {
    table: String,
    values: Row,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    table: String,
    #[serde(rename = "where")]
    filters: Filters,
    values: Row,
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    table: String,
    #[serde(rename = "where")]
    filters: Filters,
}

/// A validated, allow-listed row-store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select { table: String, query: SelectQuery },
    Insert { table: String, values: Row },
    Update { table: String, filters: Filters, values: Row },
    Delete { table: String, filters: Filters },
}

impl Operation {
    pub fn table(&self) -> &str {
        match self {
            Operation::Select { table, .. }
            | Operation::Insert { table, .. }
            | Operation::Update { table, .. }
            | Operation::Delete { table, .. } => table,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Select { .. } => "select",
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
        }
    }

    /// The single suspension point of a tool call.
    pub async fn execute(&self, store: &dyn RowStore) -> Result<Vec<Row>, StoreError> {
        match self {
            Operation::Select { table, query } => store.select(table, query).await,
            Operation::Insert { table, values } => store.insert(table, values).await,
            Operation::Update {
                table,
                filters,
                values,
            } => store.update(table, filters, values).await,
            Operation::Delete { table, filters } => store.delete(table, filters).await,
        }
    }
}

fn typed<T: for<'de> Deserialize<'de>>(arguments: &Value) -> Result<T, ServerError> {
    serde_json::from_value(arguments.clone()).map_err(|e| ServerError::Validation(e.to_string()))
}

fn require_filter(filters: Filters, verb: &'static str) -> Result<Filters, ServerError> {
    if filters.is_empty() {
        Err(ServerError::EmptyFilter(verb))
    } else {
        Ok(filters)
    }
}

pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    allowlist: TableAllowList,
    listing: Value,
}

impl ToolRegistry {
    pub fn new(allowlist: TableAllowList) -> Self {
        let tools = catalog();
        let descriptors: Vec<ToolDescriptor> = tools.iter().map(ToolDefinition::descriptor).collect();
        let listing = json!({ "tools": descriptors });
        Self {
            tools,
            allowlist,
            listing,
        }
    }

    /// The `tools/list` result, rendered once at construction.
    pub fn listing(&self) -> &Value {
        &self.listing
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn allowlist(&self) -> &TableAllowList {
        &self.allowlist
    }

    /// Resolve, validate and gate a tool call without touching the row store.
    pub fn prepare(&self, name: &str, arguments: &Value) -> Result<Operation, ServerError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ServerError::UnknownTool(name.to_string()))?;

        tool.schema.validate(arguments)?;

        match tool.kind {
            ToolKind::Select => {
                let args: SelectArgs = typed(arguments)?;
                self.allowlist.check(&args.table)?;
                Ok(Operation::Select {
                    table: args.table,
                    query: SelectQuery {
                        columns: args.columns,
                        filters: args.filters,
                        order: args.order_by.map(|column| OrderBy {
                            column,
                            ascending: args.ascending.unwrap_or(true),
                        }),
                        limit: args.limit,
                    },
                })
            }
            ToolKind::Insert => {
                let args: InsertArgs = typed(arguments)?;
                self.allowlist.check(&args.table)?;
                Ok(Operation::Insert {
                    table: args.table,
                    values: args.values,
                })
            }
            ToolKind::Update => {
                let args: UpdateArgs = typed(arguments)?;
                self.allowlist.check(&args.table)?;
                Ok(Operation::Update {
                    filters: require_filter(args.filters, "update")?,
                    table: args.table,
                    values: args.values,
                })
            }
            ToolKind::Delete => {
                let args: DeleteArgs = typed(arguments)?;
                self.allowlist.check(&args.table)?;
                Ok(Operation::Delete {
                    filters: require_filter(args.filters, "delete")?,
                    table: args.table,
                })
            }
        }
    }
}
