//! Pipeline progress ledger
//!
//! One row per pipeline. Every operation is its own committed statement so
//! progress is durable independently of the data-insert transactions: the
//! chunk write commits first, the ledger write follows, and a crash between
//! the two costs at most one redone chunk (safe under ON CONFLICT DO
//! NOTHING).
//!
//! The ledger stores the SHA-256 of the source CSV. Resume correctness
//! depends on stable row order, so a digest mismatch invalidates the entry
//! and the pipeline starts fresh.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::io::Read;
use std::path::Path;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

pub const LEDGER_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS pipeline_progress (
    pipeline_name      text PRIMARY KEY,
    status             text NOT NULL DEFAULT 'pending',
    last_row_processed bigint NOT NULL DEFAULT 0,
    total_rows         bigint NOT NULL DEFAULT 0,
    source_digest      text,
    started_at         timestamptz NOT NULL DEFAULT now(),
    updated_at         timestamptz NOT NULL DEFAULT now()
)
"#;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerEntry {
    pub pipeline_name: String,
    pub status: String,
    pub last_row_processed: i64,
    pub total_rows: i64,
    pub source_digest: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// What the orchestrator should do with a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Already completed against the same source file.
    Skip,
    /// Partially loaded; continue after this many cleaned rows.
    Resume(i64),
    /// Never run, source changed, or nothing durable to continue from.
    Fresh,
}

/// Pure skip/resume/fresh decision, separated from the database so the
/// matrix is testable.
pub fn decide(entry: Option<&LedgerEntry>, source_digest: &str) -> Decision {
    let Some(entry) = entry else {
        return Decision::Fresh;
    };
    match entry.source_digest.as_deref() {
        Some(recorded) if recorded != source_digest => return Decision::Fresh,
        None => return Decision::Fresh,
        _ => {}
    }
    match entry.status.as_str() {
        STATUS_COMPLETED => Decision::Skip,
        STATUS_IN_PROGRESS | STATUS_FAILED if entry.last_row_processed > 0 => {
            Decision::Resume(entry.last_row_processed)
        }
        _ => Decision::Fresh,
    }
}

/// SHA-256 of a file, streamed; same "sha256:<hex>" shape the store uses
/// everywhere a content hash appears.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("INPUT_MISSING: cannot read {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

pub async fn get_status(pool: &PgPool, name: &str) -> Result<Option<LedgerEntry>> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        "SELECT pipeline_name, status, last_row_processed, total_rows, source_digest, updated_at
         FROM pipeline_progress WHERE pipeline_name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(entry)
}

pub async fn all_entries(pool: &PgPool) -> Result<Vec<LedgerEntry>> {
    let entries = sqlx::query_as::<_, LedgerEntry>(
        "SELECT pipeline_name, status, last_row_processed, total_rows, source_digest, updated_at
         FROM pipeline_progress ORDER BY pipeline_name",
    )
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Register a run. On a resumed run the durable offset is preserved; a fresh
/// run passes `reset_offset = true` to zero it.
pub async fn mark_started(
    pool: &PgPool,
    name: &str,
    total_rows: i64,
    source_digest: &str,
    reset_offset: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO pipeline_progress
            (pipeline_name, status, last_row_processed, total_rows, source_digest, started_at, updated_at)
        VALUES ($1, 'in_progress', 0, $2, $3, now(), now())
        ON CONFLICT (pipeline_name) DO UPDATE SET
            status = 'in_progress',
            last_row_processed = CASE WHEN $4 THEN 0 ELSE pipeline_progress.last_row_processed END,
            total_rows = $2,
            source_digest = $3,
            started_at = now(),
            updated_at = now()
        "#,
    )
    .bind(name)
    .bind(total_rows)
    .bind(source_digest)
    .bind(reset_offset)
    .execute(pool)
    .await
    .context("DB_FAILURE: ledger mark_started")?;
    Ok(())
}

/// Record durable progress after a chunk's data transaction committed.
pub async fn record_chunk(pool: &PgPool, name: &str, new_last_row: i64) -> Result<()> {
    sqlx::query(
        "UPDATE pipeline_progress
         SET status = 'in_progress', last_row_processed = $2, updated_at = now()
         WHERE pipeline_name = $1",
    )
    .bind(name)
    .bind(new_last_row)
    .execute(pool)
    .await
    .context("DB_FAILURE: ledger record_chunk")?;
    Ok(())
}

pub async fn mark_completed(pool: &PgPool, name: &str) -> Result<()> {
    sqlx::query(
        "UPDATE pipeline_progress
         SET status = 'completed', last_row_processed = total_rows, updated_at = now()
         WHERE pipeline_name = $1",
    )
    .bind(name)
    .execute(pool)
    .await
    .context("DB_FAILURE: ledger mark_completed")?;
    Ok(())
}

/// Freeze the entry at the last durable offset. The offset is not touched:
/// whatever record_chunk last wrote is where the next run resumes.
pub async fn mark_failed(pool: &PgPool, name: &str) -> Result<()> {
    sqlx::query(
        "UPDATE pipeline_progress
         SET status = 'failed', updated_at = now()
         WHERE pipeline_name = $1",
    )
    .bind(name)
    .execute(pool)
    .await
    .context("DB_FAILURE: ledger mark_failed")?;
    Ok(())
}

// =============================================================================
// TESTS - decision matrix (database-free)
// =============================================================================
