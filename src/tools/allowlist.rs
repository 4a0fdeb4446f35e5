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

use std::collections::BTreeSet;

use crate::core::errors::ServerError;
use crate::tools::schema::is_identifier;

/// Fixed set of tables the tools may touch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableAllowList {
    tables: BTreeSet<String>,
}

impl TableAllowList {
    pub fn new<I, S>(tables: I) -> Result<Self, ServerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables: BTreeSet<String> = tables.into_iter().map(Into::into).collect();
        if tables.is_empty() {
            return Err(ServerError::Configuration(
                "table allow-list must not be empty".to_string(),
            ));
        }
        if let Some(bad) = tables.iter().find(|t| !is_identifier(t)) {
            return Err(ServerError::Configuration(format!(
                "invalid table name in allow-list: {:?}",
                bad
            )));
        }
        Ok(Self { tables })
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Hard gate: `Ok` only for listed tables.
    pub fn check(&self, table: &str) -> Result<(), ServerError> {
        if self.contains(table) {
            Ok(())
        } else {
            Err(ServerError::TableNotAllowed(table.to_string()))
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }
}
