//! Reference (dimension) ETL
//!
//! One pipeline per dimension table. Loads the combined definition CSV,
//! cleans it, keys every surviving row by fingerprint over the declared hash
//! columns, and upserts the whole table in one transaction with ON CONFLICT
//! DO NOTHING. A failed insert rolls the whole pipeline back; no partial
//! state remains. Reference tables are small, so anything not marked
//! completed is simply re-run in full.

use anyhow::{bail, Context, Result};
use sqlx::{PgPool, QueryBuilder};
use std::path::Path;

use crate::catalog::ReferenceSpec;
use crate::fingerprint::fingerprint;
use crate::frame::Frame;
use crate::ledger::{self, Decision};

/// A dimension row ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    pub id: i64,
    /// Payload values, in spec.columns order.
    pub values: Vec<Option<String>>,
    pub source_dataset: Option<String>,
}

/// How a pipeline run resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped,
    Resumed,
    Started,
}

/// Clean the loaded frame per the common sequence and the spec.
pub fn clean(spec: &ReferenceSpec, mut frame: Frame) -> Result<Frame> {
    frame.apply_sentinel_nulls();
    frame.rename_columns(spec.renames);
    frame.strip_codes(spec.strip);

    if spec.has_source_dataset && frame.column_index("source_dataset").is_none() {
        bail!(
            "CLEAN_FAILURE: {} definition CSV lacks a source_dataset column",
            spec.name
        );
    }

    // Business-code formatting (e.g. flags uppercase) happens in-frame so
    // the stored value and the hashed value cannot diverge.
    if let Some(idx) = frame.column_index(spec.business_key) {
        for row in 0..frame.len() {
            if let Some(v) = frame.cell(row, idx) {
                let formatted = spec.format.apply(v);
                frame.set(row, idx, Some(formatted));
            }
        }
    }

    frame.drop_rows_where_null(spec.business_key);
    frame.dedup_rows();
    Ok(frame)
}

/// Build insertable records; rows whose fingerprint resolves to null (a
/// hash column emptied out in cleaning) are dropped with the business key.
pub fn build_records(spec: &ReferenceSpec, frame: &Frame) -> Vec<ReferenceRecord> {
    let mut records = Vec::with_capacity(frame.len());
    for row in 0..frame.len() {
        let map = frame.row_map(row);
        let Some(id) = fingerprint(&map, spec.hash_columns) else {
            continue;
        };
        let values = spec
            .columns
            .iter()
            .map(|c| frame.get(row, c).map(|v| v.to_string()))
            .collect();
        let source_dataset = if spec.has_source_dataset {
            frame.get(row, "source_dataset").map(|v| v.to_string())
        } else {
            None
        };
        records.push(ReferenceRecord { id, values, source_dataset });
    }
    records
}

/// Run one reference pipeline. Skips when the ledger says completed against
/// an unchanged source file; otherwise re-runs in full.
pub async fn run(pool: &PgPool, spec: &ReferenceSpec, data_dir: &Path) -> Result<RunOutcome> {
    let path = data_dir.join(spec.csv);
    let digest = ledger::file_digest(&path)?;

    let entry = ledger::get_status(pool, spec.name).await?;
    if decide_full_rerun(ledger::decide(entry.as_ref(), &digest)) == RunOutcome::Skipped {
        println!("  [{}] completed, skipping", spec.name);
        return Ok(RunOutcome::Skipped);
    }

    let frame = clean(spec, Frame::from_csv_path(&path)?)?;
    let records = build_records(spec, &frame);
    println!("  [{}] {} row(s) after cleaning", spec.name, records.len());

    ledger::mark_started(pool, spec.name, records.len() as i64, &digest, true).await?;

    let result = insert_all(pool, spec, &records).await;
    match result {
        Ok(()) => {
            ledger::mark_completed(pool, spec.name).await?;
            Ok(RunOutcome::Started)
        }
        Err(e) => {
            ledger::mark_failed(pool, spec.name).await?;
            Err(e).with_context(|| format!("DB_FAILURE: reference pipeline {}", spec.name))
        }
    }
}

/// References never resume; any non-skip decision is a full re-run.
fn decide_full_rerun(decision: Decision) -> RunOutcome {
    match decision {
        Decision::Skip => RunOutcome::Skipped,
        _ => RunOutcome::Started,
    }
}

/// One transaction for the whole dimension, batched under the bind limit.
async fn insert_all(pool: &PgPool, spec: &ReferenceSpec, records: &[ReferenceRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let insert_columns = spec.insert_columns();
    let batch_rows = (crate::catalog::CHUNK_PARAM_BUDGET / insert_columns.len()).max(1);

    let mut tx = pool.begin().await?;
    for batch in records.chunks(batch_rows) {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            spec.name,
            insert_columns.join(", ")
        ));
        qb.push_values(batch.iter(), |mut b, record| {
            b.push_bind(record.id);
            for value in &record.values {
                b.push_bind(value.as_deref());
            }
            if spec.has_source_dataset {
                b.push_bind(record.source_dataset.as_deref());
            }
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build().execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::dimension;
    use crate::fingerprint::fingerprint;
    use std::collections::HashMap;

    fn clean_frame(spec: &ReferenceSpec, csv: &str) -> Frame {
        clean(spec, Frame::from_csv_str(csv).unwrap()).unwrap()
    }

    #[test]
    fn test_area_codes_basic_load() {
        let spec = dimension("area_codes").unwrap();
        let csv = "Area Code,Area,Area Code (M49),source_dataset\n\
                   4,Algeria,'012,prices\n";
        let frame = clean_frame(spec, csv);
        let records = build_records(spec, &frame);

        assert_eq!(records.len(), 1);
        let mut expected = HashMap::new();
        expected.insert("area_code".to_string(), Some("4".to_string()));
        expected.insert("source_dataset".to_string(), Some("prices".to_string()));
        assert_eq!(
            records[0].id,
            fingerprint(&expected, &["area_code", "source_dataset"]).unwrap()
        );
        assert_eq!(records[0].values[1].as_deref(), Some("Algeria"));
        assert_eq!(records[0].values[2].as_deref(), Some("012"));
        assert_eq!(records[0].source_dataset.as_deref(), Some("prices"));
    }

    #[test]
    fn test_duplicate_rows_collapse() {
        let spec = dimension("area_codes").unwrap();
        let csv = "Area Code,Area,Area Code (M49),source_dataset\n\
                   4,Algeria,'012,prices\n\
                   4,Algeria,'012,prices\n";
        let frame = clean_frame(spec, csv);
        assert_eq!(build_records(spec, &frame).len(), 1);
    }

    #[test]
    fn test_same_code_two_datasets_stays_distinct() {
        let spec = dimension("area_codes").unwrap();
        let csv = "Area Code,Area,Area Code (M49),source_dataset\n\
                   4,Algeria,'012,prices\n\
                   4,Algeria,'012,exchange_rate\n";
        let frame = clean_frame(spec, csv);
        let records = build_records(spec, &frame);
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].id, records[1].id);
    }

    #[test]
    fn test_null_business_key_dropped() {
        let spec = dimension("elements").unwrap();
        let csv = "Element Code,Element,source_dataset\n\
                   ,Producer Price,prices\n\
                   nan,Producer Price,prices\n\
                   5532,Producer Price (USD/tonne),prices\n";
        let frame = clean_frame(spec, csv);
        let records = build_records(spec, &frame);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values[0].as_deref(), Some("5532"));
    }

    #[test]
    fn test_flags_uppercased_and_unscoped() {
        let spec = dimension("flags").unwrap();
        let csv = "Flag,Description\n\
                   a,Official figure\n";
        let frame = clean_frame(spec, csv);
        let records = build_records(spec, &frame);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values[0].as_deref(), Some("A"));
        assert_eq!(records[0].source_dataset, None);

        let mut expected = HashMap::new();
        expected.insert("flag".to_string(), Some("A".to_string()));
        assert_eq!(records[0].id, fingerprint(&expected, &["flag"]).unwrap());
    }

    #[test]
    fn test_missing_source_dataset_column_fails() {
        let spec = dimension("area_codes").unwrap();
        let result = clean(spec, Frame::from_csv_str("Area Code,Area\n4,Algeria\n").unwrap());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("CLEAN_FAILURE"));
    }

    #[test]
    fn test_build_records_determinism() {
        let spec = dimension("item_codes").unwrap();
        let csv = "Item Code,Item,Item Code (CPC),source_dataset\n\
                   '0111,Wheat,'F0111,prices\n\
                   '0112,Maize,'F0112,prices\n";
        let a = build_records(spec, &clean_frame(spec, csv));
        let b = build_records(spec, &clean_frame(spec, csv));
        assert_eq!(a, b);
    }
}
