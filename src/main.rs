//! CLI entry point for the ingestion tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ctgov_ingest::credentials::SecretStore;
use ctgov_ingest::load::warehouse_from_config;
use ctgov_ingest::{ConfigOverrides, IngestConfig, InvocationResponse, ingest};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

mod cli;

use cli::{Args, Command, IngestArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    // Flags win over environment values, so merge them before validating
    let overrides = match &args.command {
        Command::Ingest(ingest_args) => ingest_args.overrides(),
        Command::Ping => ConfigOverrides::default(),
    };
    let config = IngestConfig::from_env(&overrides).context("invalid configuration")?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > LOG_LEVEL > info
    let default_level = if args.quiet {
        LevelFilter::ERROR
    } else {
        match args.verbose {
            0 => config.log_level,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::default().add_directive(default_level.into()));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match &args.command {
        Command::Ingest(ingest_args) => run_ingest(&config, ingest_args).await,
        Command::Ping => run_ping(&config).await,
    }
}

async fn run_ingest(config: &IngestConfig, args: &IngestArgs) -> Result<()> {
    debug!(?config, "effective configuration");

    let secret_store = secret_store(config).await;
    let summary = ingest(config, secret_store)
        .await
        .context("ingestion failed")?;

    info!(
        stored = summary.stored,
        pages = summary.pages,
        destination = %summary.destination,
        "done"
    );

    if args.emit_status {
        println!("{}", serde_json::to_string(&InvocationResponse::ok())?);
    }
    Ok(())
}

async fn run_ping(config: &IngestConfig) -> Result<()> {
    let warehouse =
        warehouse_from_config(&config.warehouse, None).context("invalid warehouse location")?;
    let report = warehouse.ping().await.context("warehouse is not reachable")?;
    println!("warehouse version: {}", report.version);
    match report.raw_rows {
        Some(rows) => println!("raw table rows: {rows}"),
        None => println!("raw table rows: table not created yet"),
    }
    warehouse.close().await;
    Ok(())
}

#[cfg(feature = "aws-secrets")]
async fn secret_store(config: &IngestConfig) -> Option<Arc<dyn SecretStore>> {
    if config.warehouse.secret_id.is_none() {
        return None;
    }
    let store = ctgov_ingest::credentials::AwsSecretsManager::from_env().await;
    Some(Arc::new(store))
}

#[cfg(not(feature = "aws-secrets"))]
#[allow(clippy::unused_async)]
async fn secret_store(_config: &IngestConfig) -> Option<Arc<dyn SecretStore>> {
    None
}
