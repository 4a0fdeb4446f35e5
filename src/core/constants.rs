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

//! Centralized constants for rowgate.
//!
//! Error codes, method names, tool names, configuration keys and limits
//! live here so the wire contract is defined in one place.

pub mod jsonrpc {
    /// JSON-RPC protocol version tag
    pub const VERSION: &str = "2.0";
    /// Parse error (standard JSON-RPC). Reserved for framing failures.
    pub const ERROR_PARSE: i32 = -32700;
    /// Invalid request (standard JSON-RPC)
    pub const ERROR_INVALID_REQUEST: i32 = -32600;
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params (standard JSON-RPC)
    pub const ERROR_INVALID_PARAMS: i32 = -32602;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;
    /// Row-store rejected or failed the operation (custom code)
    pub const ERROR_BACKEND: i32 = -32000;
    /// Table not on the allow-list, or unbounded mutation (custom code)
    pub const ERROR_FORBIDDEN: i32 = -32001;
    /// Row-store call exceeded the per-call timeout (custom code)
    pub const ERROR_TIMEOUT: i32 = -32002;
    /// Caller exceeded the configured call rate (custom code)
    pub const ERROR_RATE_LIMITED: i32 = -32003;
    /// Tool name not in the catalog (custom code)
    pub const ERROR_UNKNOWN_TOOL: i32 = -32004;
}

pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

pub mod tools {
    pub const SELECT: &str = "supabase_select";
    pub const INSERT: &str = "supabase_insert";
    pub const UPDATE: &str = "supabase_update";
    pub const DELETE: &str = "supabase_delete";
}

pub mod server {
    /// Name reported in the `initialize` result
    pub const NAME: &str = "rowgate";
    /// Version reported in the `initialize` result
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    /// Rate-limit key used before the client identifies itself
    pub const ANONYMOUS_CLIENT: &str = "anonymous";
}

pub mod config {
    pub const ENV_CONFIG_PATH: &str = "ROWGATE_CONFIG";
    pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
    pub const ENV_SUPABASE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
    pub const ENV_ALLOWED_TABLES: &str = "ROWGATE_ALLOWED_TABLES";
    pub const ENV_CALL_TIMEOUT_MS: &str = "ROWGATE_CALL_TIMEOUT_MS";
    pub const ENV_RATE_LIMIT_MAX: &str = "ROWGATE_RATE_LIMIT_MAX";
    pub const ENV_RATE_LIMIT_WINDOW_SECS: &str = "ROWGATE_RATE_LIMIT_WINDOW_SECS";
    pub const ENV_MAX_LINE_BYTES: &str = "ROWGATE_MAX_LINE_BYTES";

    pub const DEFAULT_ALLOWED_TABLES: &[&str] =
        &["packages", "bundles", "community_posts", "profiles"];
}

pub mod limits {
    /// Maximum allowed JSON-RPC line size (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: usize = 10 * 1024 * 1024;
    /// Default per-call row-store timeout
    pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
    /// Inclusive bounds for `supabase_select.limit`
    pub const SELECT_LIMIT_MIN: i64 = 1;
    pub const SELECT_LIMIT_MAX: i64 = 200;
    /// Postgres identifier length limit
    pub const MAX_IDENTIFIER_LEN: usize = 63;
    /// Depth of the downstream event and response channels
    pub const CHANNEL_CAPACITY: usize = 32;
}
