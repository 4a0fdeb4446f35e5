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

use serde_json::Value;
use thiserror::Error;

use crate::core::constants::jsonrpc;
use crate::core::models::JsonRpcResponse;
use crate::store::StoreError;

/// Main error type for the server.
///
/// Every variant maps to exactly one JSON-RPC error code so the calling
/// agent can tell bad input (fix and retry) from a forbidden table (give up)
/// from a backend failure.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Line was not valid JSON (framing level)
    #[error("Parse error")]
    Parse,

    /// Valid JSON that is not a JSON-RPC 2.0 request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown method: {0}")]
    MethodNotFound(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed the tool's input schema
    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Table not allowed: {0}")]
    TableNotAllowed(String),

    /// Update/delete with an empty `where`
    #[error("Refusing to {0} without a where filter")]
    EmptyFilter(&'static str),

    #[error("Backend error: {0}")]
    Backend(#[from] StoreError),

    #[error("Backend call timed out after {0} ms")]
    Timeout(u64),

    #[error("Rate limit exceeded for client '{0}'")]
    RateLimited(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// JSON-RPC error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            ServerError::Parse => jsonrpc::ERROR_PARSE,
            ServerError::InvalidRequest(_) => jsonrpc::ERROR_INVALID_REQUEST,
            ServerError::MethodNotFound(_) => jsonrpc::ERROR_METHOD_NOT_FOUND,
            ServerError::UnknownTool(_) => jsonrpc::ERROR_UNKNOWN_TOOL,
            ServerError::Validation(_) => jsonrpc::ERROR_INVALID_PARAMS,
            ServerError::TableNotAllowed(_) | ServerError::EmptyFilter(_) => {
                jsonrpc::ERROR_FORBIDDEN
            }
            ServerError::Backend(_) => jsonrpc::ERROR_BACKEND,
            ServerError::Timeout(_) => jsonrpc::ERROR_TIMEOUT,
            ServerError::RateLimited(_) => jsonrpc::ERROR_RATE_LIMITED,
            ServerError::Configuration(_) | ServerError::Io(_) | ServerError::Internal(_) => {
                jsonrpc::ERROR_INTERNAL
            }
        }
    }

    pub fn into_response(self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::error(id, self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_errors_share_forbidden_code() {
        assert_eq!(
            ServerError::TableNotAllowed("x".into()).code(),
            ServerError::EmptyFilter("delete").code()
        );
        assert_ne!(
            ServerError::TableNotAllowed("x".into()).code(),
            ServerError::Validation("bad".into()).code()
        );
    }

    #[test]
    fn test_backend_message_is_verbatim() {
        let err = ServerError::from(StoreError::Rejected {
            status: Some(409),
            message: "duplicate key value violates unique constraint".into(),
        });
        let resp = err.into_response(Value::from(4));
        let error = resp.error.unwrap();
        assert_eq!(error.code, jsonrpc::ERROR_BACKEND);
        assert!(error.message.contains("duplicate key value"));
    }

    #[test]
    fn test_parse_error_message() {
        assert_eq!(ServerError::Parse.to_string(), "Parse error");
        assert_eq!(ServerError::Parse.code(), -32700);
    }
}
