//! ar-metrics - availability/reliability report server
//!
//! # Usage
//!
//! ```bash
//! # Serve reports (default subcommand)
//! ar-metrics --config ar_metrics.toml serve
//!
//! # Load JSON-lines samples into a tenant database
//! ar-metrics import --database egi_ar samples.jsonl
//!
//! # Print the effective configuration
//! ar-metrics config
//! ```
//!
//! # Environment Variables
//!
//! - `AR_METRICS_CONFIG`: path to the TOML config file
//! - `RUST_LOG`: logging level (default: info); `--json-logs` switches to JSON lines

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ar_metrics::api::{self, ApiState};
use ar_metrics::cache::ResultCache;
use ar_metrics::config::AppConfig;
use ar_metrics::import;
use ar_metrics::service::ReportService;
use ar_metrics::storage::SledStore;
use ar_metrics::tenant::TenantDirectory;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "ar-metrics")]
#[command(about = "Availability and reliability report server")]
#[command(version)]
struct CliArgs {
    /// Config file (overrides AR_METRICS_CONFIG and ./ar_metrics.toml)
    #[arg(short, long, env = "AR_METRICS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding server.addr
    #[arg(long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Serve the HTTP API
    Serve,
    /// Import JSON-lines samples into the sled store
    Import {
        /// Tenant database to write into
        #[arg(long)]
        database: String,

        /// Collection, defaulting to store.collection
        #[arg(long)]
        collection: Option<String>,

        /// JSON-lines file, one sample per line
        file: PathBuf,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::load(),
    };
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
        config.validate().context("invalid --addr")?;
    }
    Ok(config)
}

// ============================================================================
// Subcommands
// ============================================================================

async fn serve(config: AppConfig, cancel_token: CancellationToken) -> Result<()> {
    let store = SledStore::open(&config.store.path)
        .with_context(|| format!("opening store at {}", config.store.path.display()))?;

    let mut service = ReportService::new(Arc::new(store), config.store.collection.clone())
        .with_policy(config.rollup.policy);
    if config.cache.enabled {
        info!(
            capacity_bytes = config.cache.capacity_bytes,
            shards = config.cache.shards,
            "Report cache enabled"
        );
        service = service.with_cache(Arc::new(ResultCache::new(
            config.cache.capacity_bytes,
            config.cache.shards,
        )));
    }

    let tenants = TenantDirectory::from_config(&config.tenants);
    if tenants.is_empty() {
        tracing::warn!("No tenants configured, every report request will be rejected");
    }

    let app = api::create_app(ApiState::new(service, tenants), config.server.gzip);
    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("binding {}", config.server.addr))?;
    info!(addr = %config.server.addr, "[HttpServer] Listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            info!("[HttpServer] Received shutdown signal");
        })
        .await;

    match result {
        Ok(()) => {
            info!("[HttpServer] Graceful shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("[HttpServer] Server error: {}", e);
            Err(anyhow::anyhow!("HTTP server error: {}", e))
        }
    }
}

fn run_import(config: &AppConfig, database: &str, collection: Option<&str>, file: &Path) -> Result<()> {
    let collection = collection.unwrap_or(&config.store.collection);
    let store = SledStore::open(&config.store.path)
        .with_context(|| format!("opening store at {}", config.store.path.display()))?;
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("opening {}", file.display()))?,
    );
    let written = import::import_json_lines(&store, database, collection, reader)
        .with_context(|| format!("importing {}", file.display()))?;
    info!(written, database, collection, "Samples imported");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
    let config = load_config(&args)?;

    match &args.command {
        Some(SubCommand::Import {
            database,
            collection,
            file,
        }) => run_import(&config, database, collection.as_deref(), file),
        Some(SubCommand::Config) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Some(SubCommand::Serve) | None => {
            let cancel_token = CancellationToken::new();
            let shutdown_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_token.cancel();
            });
            serve(config, cancel_token).await
        }
    }
}
