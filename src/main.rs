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

// Main entry point for the rowgate MCP server
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use rowgate::config::{Backend, Config};
use rowgate::mcp::{Dispatcher, McpServer};
use rowgate::store::{MemoryStore, PostgrestStore, RowStore};
use rowgate::tools::ToolRegistry;
use rowgate::utils::rate_limit::InMemoryRateLimitStore;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (overrides ROWGATE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve from process-local tables instead of Supabase
    #[arg(long)]
    in_memory: bool,

    /// Table the tools may touch. Repeat to list several; replaces the configured list.
    #[arg(long = "allow-table", value_name = "TABLE")]
    allow_table: Vec<String>,

    /// Per-call row-store timeout in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Dry run: prints the effective configuration (key redacted) and exits.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    install_panic_hook();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // CLI flags (Overlay Layer)
    if cli.in_memory {
        config.backend = Backend::Memory;
    }
    if !cli.allow_table.is_empty() {
        config.allowed_tables = cli.allow_table;
    }
    if let Some(ms) = cli.timeout_ms {
        config.call_timeout_ms = ms;
    }

    config.validate().context("Invalid configuration")?;

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    init_tracing(&config);

    let run_id = uuid::Uuid::new_v4();
    let allowlist = config.allow_list()?;
    let store = build_store(&config)?;
    info!(
        %run_id,
        backend = store.name(),
        tables = ?allowlist.tables().collect::<Vec<_>>(),
        timeout_ms = config.call_timeout_ms,
        "Starting rowgate"
    );

    let mut dispatcher = Dispatcher::new(ToolRegistry::new(allowlist), store, config.call_timeout());
    if let Some(limit) = &config.rate_limit {
        info!(
            max_calls = limit.max_calls,
            window_secs = limit.window_secs,
            "Rate limiting enabled"
        );
        dispatcher = dispatcher.with_rate_limiter(Arc::new(InMemoryRateLimitStore::new(
            limit.max_calls,
            limit.window(),
        )));
    }

    let server = McpServer::new(dispatcher).with_max_line_bytes(config.max_line_bytes);
    server
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("Server loop failed")?;

    info!(%run_id, "rowgate stopped");
    Ok(())
}

fn build_store(config: &Config) -> anyhow::Result<Arc<dyn RowStore>> {
    match config.backend {
        Backend::Memory => Ok(Arc::new(MemoryStore::new())),
        Backend::Postgrest => {
            // validate() guarantees both are present.
            let url = config.supabase_url.as_deref().unwrap_or_default();
            let key = config
                .supabase_service_role_key
                .as_deref()
                .unwrap_or_default();
            let store = PostgrestStore::new(url, key, config.call_timeout())?;
            Ok(Arc::new(store))
        }
    }
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

// stdout carries the protocol, so logs always go to stderr.
fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("rowgate=info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
