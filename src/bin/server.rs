// KinderQuery - Dispatcher Server
// The production server for the tiered natural-language query dispatcher
// Run with: cargo run --bin server

//! # KinderQuery Server Binary
//!
//! Wires the pieces into a running HTTP service:
//!
//! ```text
//! main() function
//!   ↓ builds
//! QueryDispatcher (registry + dictionary + fallback pipeline + cache)
//!   ↓ wrapped by
//! DispatcherServerBuilder
//!   ↓ serves
//! HTTP API (Axum)
//! ```
//!
//! Collaborators are selected from the environment: with `DATABASE_URL` set
//! the read-only execution path talks to Postgres, otherwise every executed
//! statement fails loudly through the null executor. The LLM collaborator is
//! any OpenAI-compatible endpoint.
//!
//! ## Rust Learning Notes:
//!
//! `#[tokio::main]` turns the async main into a sync main that starts the
//! tokio runtime. `Box<dyn Error>` in the return type lets `?` propagate
//! every error kind the startup path can produce.

use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kinderquery::fallback::{NullExecutor, PostgresExecutor, ReadOnlyExecutor};
use kinderquery::llm::{LlmClient, OpenAiCompatibleClient, OpenAiCompatibleConfig};
use kinderquery::{DispatcherConfig, DispatcherServerBuilder, QueryDispatcher};

/// Tiered natural-language query dispatcher
#[derive(Parser, Debug)]
#[command(name = "kinderquery", version, about)]
struct Args {
    /// Address to bind
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind
    #[arg(long, env = "SERVER_PORT", default_value_t = 3000)]
    port: u16,

    /// Optional TOML config file with thresholds, tables and templates
    #[arg(long, env = "DISPATCHER_CONFIG")]
    config: Option<String>,

    /// Postgres connection string for the read-only execution path
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// OpenAI-compatible endpoint for the fallback tier
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    llm_base_url: String,

    /// API key for the LLM endpoint
    #[arg(long, env = "LLM_API_KEY", default_value = "")]
    llm_api_key: String,

    /// Model name for the fallback tier
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Disable permissive CORS
    #[arg(long, default_value_t = false)]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // .env is optional; production sets real environment variables
    let _ = dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    info!("🎒 Starting KinderQuery dispatcher...");
    info!("=====================================");

    let config = match &args.config {
        Some(path) => {
            info!("Loading dispatcher config from {}", path);
            DispatcherConfig::from_file(path)?
        }
        None => DispatcherConfig::default(),
    };
    info!(
        "Dispatcher config: threshold={}, max_rows={}, policy_version={}",
        config.acceptance_threshold, config.max_rows, config.tier_policy_version
    );
    info!(
        "Tables: {} actions, {} template groups",
        config.actions.len(),
        config.template_groups.len()
    );

    let executor: Arc<dyn ReadOnlyExecutor> = match &args.database_url {
        Some(url) => {
            info!("✅ Postgres execution path configured");
            Arc::new(PostgresExecutor::connect(url).await?)
        }
        None => {
            warn!("No DATABASE_URL set; statements will fail until one is configured");
            Arc::new(NullExecutor)
        }
    };

    if args.llm_api_key.is_empty() {
        warn!("No LLM_API_KEY set; the fallback tier will be rejected upstream");
    } else {
        info!("✅ LLM collaborator configured ({})", args.llm_model);
    }
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::new(OpenAiCompatibleConfig {
        base_url: args.llm_base_url.clone(),
        api_key: args.llm_api_key.clone(),
        model: args.llm_model.clone(),
        timeout_ms: config.llm_timeout_ms,
        ..OpenAiCompatibleConfig::default()
    }));

    let dispatcher = Arc::new(QueryDispatcher::new(config, llm, executor)?);

    let server = DispatcherServerBuilder::new()
        .with_host(args.host)
        .with_port(args.port)
        .with_cors(!args.no_cors)
        .with_dispatcher(dispatcher)
        .build()?;

    server.run().await
}
