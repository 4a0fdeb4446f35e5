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

//! Runtime configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional YAML
//! file, environment variables. Command-line flags are applied on top by
//! the binary.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core::constants::{config as keys, limits};
use crate::core::errors::ServerError;
use crate::tools::TableAllowList;

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Supabase REST (PostgREST)
    Postgrest,
    /// Process-local tables; nothing persists
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_calls: u32,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: Backend,
    pub supabase_url: Option<String>,
    pub supabase_service_role_key: Option<String>,
    pub allowed_tables: Vec<String>,
    pub call_timeout_ms: u64,
    pub max_line_bytes: usize,
    pub rate_limit: Option<RateLimitConfig>,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Postgrest,
            supabase_url: None,
            supabase_service_role_key: None,
            allowed_tables: keys::DEFAULT_ALLOWED_TABLES
                .iter()
                .map(|t| t.to_string())
                .collect(),
            call_timeout_ms: limits::DEFAULT_CALL_TIMEOUT_MS,
            max_line_bytes: limits::MAX_MESSAGE_SIZE_BYTES,
            rate_limit: None,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T, ServerError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ServerError::Configuration(format!("{}={:?}: {}", name, raw, e)))
}

impl Config {
    /// Defaults, then the YAML file (explicit path or `ROWGATE_CONFIG`),
    /// then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ServerError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(keys::ENV_CONFIG_PATH).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_yaml_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_from(|name| env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            ServerError::Configuration(msg) => {
                ServerError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ServerError> {
        // An empty document means "all defaults".
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(content)
            .map_err(|e| ServerError::Configuration(format!("invalid YAML: {}", e)))
    }

    /// Overlay variables from `lookup`. Unset variables leave the value alone;
    /// set but unparseable ones are an error.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(keys::ENV_SUPABASE_URL) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = lookup(keys::ENV_SUPABASE_KEY) {
            self.supabase_service_role_key = Some(key);
        }
        if let Some(level) = lookup(keys::ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(format) = lookup(keys::ENV_LOG_FORMAT) {
            self.log_format = format.to_lowercase();
        }
        if let Some(tables) = lookup(keys::ENV_ALLOWED_TABLES) {
            self.allowed_tables = tables
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = lookup(keys::ENV_CALL_TIMEOUT_MS) {
            self.call_timeout_ms = parse_var(keys::ENV_CALL_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(keys::ENV_MAX_LINE_BYTES) {
            self.max_line_bytes = parse_var(keys::ENV_MAX_LINE_BYTES, &raw)?;
        }

        let max_calls = lookup(keys::ENV_RATE_LIMIT_MAX)
            .map(|raw| parse_var::<u32>(keys::ENV_RATE_LIMIT_MAX, &raw))
            .transpose()?;
        let window_secs = lookup(keys::ENV_RATE_LIMIT_WINDOW_SECS)
            .map(|raw| parse_var::<u64>(keys::ENV_RATE_LIMIT_WINDOW_SECS, &raw))
            .transpose()?;
        if let Some(limit) = self.rate_limit.as_mut() {
            if let Some(max_calls) = max_calls {
                limit.max_calls = max_calls;
            }
            if let Some(window_secs) = window_secs {
                limit.window_secs = window_secs;
            }
        } else if let Some(max_calls) = max_calls {
            // A window alone does not enable limiting.
            self.rate_limit = Some(RateLimitConfig {
                max_calls,
                window_secs: window_secs.unwrap_or(60),
            });
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn allow_list(&self) -> Result<TableAllowList, ServerError> {
        TableAllowList::new(self.allowed_tables.iter().cloned())
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        self.allow_list()?;

        if self.call_timeout_ms == 0 {
            return Err(ServerError::Configuration(
                "call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(ServerError::Configuration(
                "max_line_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(limit) = &self.rate_limit {
            if limit.max_calls == 0 || limit.window_secs == 0 {
                return Err(ServerError::Configuration(
                    "rate_limit max_calls and window_secs must be greater than zero".to_string(),
                ));
            }
        }
        if self.backend == Backend::Postgrest {
            if self.supabase_url.as_deref().map_or(true, str::is_empty) {
                return Err(ServerError::Configuration(format!(
                    "{} is required for the postgrest backend",
                    keys::ENV_SUPABASE_URL
                )));
            }
            if self
                .supabase_service_role_key
                .as_deref()
                .map_or(true, str::is_empty)
            {
                return Err(ServerError::Configuration(format!(
                    "{} is required for the postgrest backend",
                    keys::ENV_SUPABASE_KEY
                )));
            }
        }
        Ok(())
    }

    /// Copy safe to print: the service-role key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.supabase_service_role_key.is_some() {
            copy.supabase_service_role_key = Some(REDACTED.to_string());
        }
        copy
    }
}
