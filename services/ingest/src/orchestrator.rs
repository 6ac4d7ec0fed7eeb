//! Orchestrator
//!
//! Runs every reference pipeline, then every dataset pipeline, each in its
//! declared order. The order is a static list, not discovered at runtime:
//! the dimension set is closed and small, and a hand-authored order is
//! auditable. Dimensions referenced by a dataset always precede it.

use anyhow::{bail, Result};
use sqlx::PgPool;

use crate::archive;
use crate::catalog::{FACTS, REFERENCES};
use crate::config::Config;
use crate::fact;
use crate::ledger;
use crate::reference::{self, RunOutcome};

#[derive(Debug, Default)]
pub struct Summary {
    pub skipped: usize,
    pub resumed: usize,
    pub started: usize,
}

impl Summary {
    fn add(&mut self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Skipped => self.skipped += 1,
            RunOutcome::Resumed => self.resumed += 1,
            RunOutcome::Started => self.started += 1,
        }
    }
}

/// Ensure the archives listed in the manifest are extracted. A missing
/// manifest is a warning: an operator may have pre-extracted the bundles.
pub fn extract_archives(config: &Config) -> Result<()> {
    match archive::load_manifest(&config.manifest)? {
        Some(manifest) => {
            println!("Extracting archives from {}", config.manifest.display());
            let summary = archive::extract_all(&manifest, &config.data_dir)?;
            println!(
                "Archives: {} extracted, {} up to date",
                summary.extracted, summary.skipped
            );
        }
        None => {
            eprintln!(
                "MANIFEST_MISSING: {} not found, skipping extraction",
                config.manifest.display()
            );
        }
    }
    Ok(())
}

/// Full sweep: references first, then datasets.
pub async fn run_all(pool: &PgPool, config: &Config) -> Result<Summary> {
    let mut summary = Summary::default();

    println!("\nReference pipelines ({}):", REFERENCES.len());
    for spec in REFERENCES {
        summary.add(reference::run(pool, spec, &config.data_dir).await?);
    }

    println!("\nDataset pipelines ({}):", FACTS.len());
    for spec in FACTS {
        summary.add(fact::run(pool, spec, &config.data_dir).await?);
    }

    Ok(summary)
}

/// Run a single named pipeline (reference or dataset).
pub async fn run_one(pool: &PgPool, config: &Config, name: &str) -> Result<Summary> {
    let mut summary = Summary::default();
    if let Some(spec) = REFERENCES.iter().find(|r| r.name == name) {
        summary.add(reference::run(pool, spec, &config.data_dir).await?);
        return Ok(summary);
    }
    if let Some(spec) = FACTS.iter().find(|f| f.name == name) {
        summary.add(fact::run(pool, spec, &config.data_dir).await?);
        return Ok(summary);
    }
    bail!("unknown pipeline '{}'", name);
}

/// Print the ledger for operators.
pub async fn print_status(pool: &PgPool) -> Result<()> {
    let entries = ledger::all_entries(pool).await?;
    if entries.is_empty() {
        println!("Ledger is empty: no pipeline has run yet.");
        return Ok(());
    }
    println!(
        "{:<40} {:<12} {:>14} {:>14}  {}",
        "pipeline", "status", "last_row", "total_rows", "updated_at"
    );
    println!("{:-<105}", "");
    for e in entries {
        println!(
            "{:<40} {:<12} {:>14} {:>14}  {}",
            e.pipeline_name,
            e.status,
            e.last_row_processed,
            e.total_rows,
            e.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
