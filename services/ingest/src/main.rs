//! Ingest Service - loads the FAO bulk corpus into the relational store
//!
//! Responsibilities:
//! - Extract archive bundles per the manifest (skip when up to date)
//! - Apply the star schema derived from the pipeline catalog
//! - Run every reference pipeline, then every dataset pipeline
//! - Track per-pipeline progress in the ledger (skip / resume / run-fresh)
//!
//! The whole sweep is one idempotent command: rerunning skips completed
//! pipelines and resumes interrupted ones from their last committed chunk.
//!
//! Usage:
//!   # Full sweep (extraction + all pipelines):
//!   cargo run --bin ingest
//!
//!   # One pipeline:
//!   cargo run --bin ingest -- --only prices
//!
//!   # Inspect the ledger:
//!   cargo run --bin ingest -- --status

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

mod archive;
mod catalog;
mod config;
mod fact;
mod fingerprint;
mod frame;
mod ledger;
mod orchestrator;
mod reference;
mod schema;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Loads the FAO bulk corpus into the relational store")]
struct Args {
    /// Run a single pipeline by name instead of the full sweep
    #[arg(long)]
    only: Option<String>,

    /// Skip archive extraction (bundles already expanded)
    #[arg(long, default_value = "false")]
    skip_extract: bool,

    /// Print the progress ledger and exit
    #[arg(long, default_value = "false")]
    status: bool,

    /// Override DATA_DIR from the environment
    #[arg(long)]
    data_dir: Option<String>,

    /// Override MANIFEST from the environment
    #[arg(long)]
    manifest: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir.into();
    }
    if let Some(manifest) = args.manifest {
        config.manifest = manifest.into();
    }

    println!("=== FAO Corpus Ingest ===");
    println!("Data dir: {}", config.data_dir.display());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .context("Failed to connect to database")?;

    schema::create_all(&pool).await?;

    if args.status {
        orchestrator::print_status(&pool).await?;
        return Ok(());
    }

    if !args.skip_extract {
        orchestrator::extract_archives(&config)?;
    }

    let summary = if let Some(name) = &args.only {
        orchestrator::run_one(&pool, &config, name).await?
    } else {
        orchestrator::run_all(&pool, &config).await?
    };

    println!("\n=== Ingest Summary ===");
    println!("Skipped: {}", summary.skipped);
    println!("Resumed: {}", summary.resumed);
    println!("Started: {}", summary.started);

    Ok(())
}
