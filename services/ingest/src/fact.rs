//! Dataset (fact) ETL
//!
//! One pipeline per dataset. The load recomputes every dimension surrogate
//! key inline from the business codes the CSV carries, through the SAME
//! dimension declaration the reference pipeline used, so no dimension
//! lookup ever happens while loading. The cleaned frame is split into
//! chunks; each chunk commits in its own transaction and is followed by a
//! durable ledger write, which makes a killed load resumable from the last
//! committed chunk.

use anyhow::{bail, Context, Result};
use sqlx::{PgPool, QueryBuilder};
use std::path::Path;

use crate::catalog::{dimension, ColType, FactColumn, FactSpec};
use crate::fingerprint::fingerprint;
use crate::frame::{coerce_float, coerce_int, Frame};
use crate::ledger::{self, Decision};
use crate::reference::RunOutcome;

/// Clean a raw dataset frame and derive its foreign-key columns. This stage
/// is DETERMINISTIC: resume offsets count rows of its output.
pub fn prepare(spec: &FactSpec, mut frame: Frame) -> Result<Frame> {
    frame.apply_sentinel_nulls();
    frame.rename_columns(spec.renames);
    frame.strip_codes(spec.strip);
    frame.map_numeric_sentinels(&spec.numeric_columns());

    derive_fks(spec, &mut frame)?;

    frame.drop_columns(spec.exclude);
    frame.dedup_rows();
    Ok(frame)
}

/// Compute one FK column per spec entry. The hash columns and pre-hash
/// formatting come from the referenced dimension's declaration; the literal
/// hash column `source_dataset` takes this fact table's name.
fn derive_fks(spec: &FactSpec, frame: &mut Frame) -> Result<()> {
    for fk in spec.fks {
        let Some(dim) = dimension(fk.dimension) else {
            bail!("{} references undeclared dimension {}", spec.name, fk.dimension);
        };

        let mut values: Vec<Option<String>> = Vec::with_capacity(frame.len());
        for row in 0..frame.len() {
            let mut input = std::collections::HashMap::new();
            for col in dim.hash_columns {
                let value = if *col == "source_dataset" {
                    Some(spec.name.to_string())
                } else {
                    frame.get(row, col).map(|v| dim.format.apply(v))
                };
                input.insert(col.to_string(), value);
            }
            values.push(fingerprint(&input, dim.hash_columns).map(|id| id.to_string()));
        }
        frame.add_column(fk.target, values);
    }
    Ok(())
}

/// Chunk boundaries over the cleaned frame, starting at the resume offset.
pub fn chunk_bounds(total: usize, start: usize, chunk_rows: usize) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut offset = start;
    while offset < total {
        let end = (offset + chunk_rows).min(total);
        bounds.push((offset, end));
        offset = end;
    }
    bounds
}

/// Run one dataset pipeline: skip, resume, or start fresh per the ledger
/// and the source file digest.
pub async fn run(pool: &PgPool, spec: &FactSpec, data_dir: &Path) -> Result<RunOutcome> {
    let path = data_dir.join(spec.csv);
    let digest = ledger::file_digest(&path)?;

    let entry = ledger::get_status(pool, spec.name).await?;
    let decision = ledger::decide(entry.as_ref(), &digest);
    if decision == Decision::Skip {
        println!("  [{}] completed, skipping", spec.name);
        return Ok(RunOutcome::Skipped);
    }

    let frame = prepare(spec, Frame::from_csv_path(&path)?)?;
    let total = frame.len();

    let (start, outcome) = match decision {
        Decision::Resume(offset) => {
            let offset = (offset.max(0) as usize).min(total);
            println!(
                "  [{}] resuming at row {} of {}",
                spec.name, offset, total
            );
            (offset, RunOutcome::Resumed)
        }
        _ => {
            println!("  [{}] {} row(s) after cleaning", spec.name, total);
            (0, RunOutcome::Started)
        }
    };

    ledger::mark_started(pool, spec.name, total as i64, &digest, start == 0).await?;

    let columns = spec.columns();
    let chunk_rows = spec.chunk_rows();
    for (chunk_start, chunk_end) in chunk_bounds(total, start, chunk_rows) {
        if let Err(e) = insert_chunk(pool, spec, &frame, &columns, chunk_start, chunk_end).await {
            // The failed chunk rolled back; the ledger keeps the offset of
            // the last chunk that committed.
            ledger::mark_failed(pool, spec.name).await?;
            return Err(e).with_context(|| {
                format!(
                    "DB_FAILURE: dataset pipeline {} at rows {}..{}",
                    spec.name, chunk_start, chunk_end
                )
            });
        }
        ledger::record_chunk(pool, spec.name, chunk_end as i64).await?;
    }

    ledger::mark_completed(pool, spec.name).await?;
    println!("  [{}] completed", spec.name);
    Ok(outcome)
}

/// Insert one chunk in its own transaction. Re-sending a chunk a resumed
/// run already committed is safe: the natural-key unique index plus ON
/// CONFLICT DO NOTHING keeps materialization at-most-once.
async fn insert_chunk(
    pool: &PgPool,
    spec: &FactSpec,
    frame: &Frame,
    columns: &[FactColumn],
    start: usize,
    end: usize,
) -> Result<()> {
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    let indices: Vec<Option<usize>> = names.iter().map(|n| frame.column_index(n)).collect();

    let mut tx = pool.begin().await?;
    let mut qb: QueryBuilder<'_, sqlx::Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", spec.name, names.join(", ")));

    qb.push_values(start..end, |mut b, row| {
        for (column, idx) in columns.iter().zip(&indices) {
            let cell = idx.and_then(|i| frame.cell(row, i));
            match column.ty {
                ColType::BigInt => b.push_bind(cell.and_then(|v| v.parse::<i64>().ok())),
                ColType::Int => b.push_bind(cell.and_then(coerce_int)),
                ColType::Float => b.push_bind(cell.and_then(coerce_float)),
                ColType::Text => b.push_bind(cell),
            };
        }
    });
    qb.push(" ON CONFLICT DO NOTHING");
    qb.build().execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fact;
    use crate::reference::{build_records, clean as clean_reference};
    use std::collections::HashMap;

    const PRICES_CSV: &str = "\
Area Code,Area Code (M49),Area,Item Code,Item Code (CPC),Item,Element Code,Element,Months Code,Months,Year Code,Year,Unit,Value,Flag\n\
'4,'012,Algeria,'0111,'F0111,Wheat,5532,Producer Price (USD/tonne),7021,Annual value,2015,2015,USD,123.45,A\n";

    fn prepared_prices() -> Frame {
        let spec = fact("prices").unwrap();
        prepare(spec, Frame::from_csv_str(PRICES_CSV).unwrap()).unwrap()
    }

    // -------------------------------------------------------------------------
    // FK DERIVATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_fk_columns_present_and_descriptive_columns_gone() {
        let frame = prepared_prices();
        let cols = frame.columns();
        assert!(cols.contains(&"area_code_id".to_string()));
        assert!(cols.contains(&"item_code_id".to_string()));
        assert!(cols.contains(&"element_code_id".to_string()));
        assert!(cols.contains(&"flag_id".to_string()));
        assert!(!cols.contains(&"area".to_string()));
        assert!(!cols.contains(&"area_code".to_string()));
        assert!(!cols.contains(&"item".to_string()));
        assert!(!cols.contains(&"flag".to_string()));
    }

    #[test]
    fn test_fk_equals_direct_fingerprint() {
        let frame = prepared_prices();
        let mut expected = HashMap::new();
        expected.insert("area_code".to_string(), Some("4".to_string()));
        expected.insert("source_dataset".to_string(), Some("prices".to_string()));
        let id = fingerprint(&expected, &["area_code", "source_dataset"]).unwrap();
        assert_eq!(frame.get(0, "area_code_id"), Some(id.to_string().as_str()));
    }

    #[test]
    fn test_flag_fk_hashes_flag_alone_uppercased() {
        let csv = PRICES_CSV.replace(",A\n", ",a\n");
        let spec = fact("prices").unwrap();
        let frame = prepare(spec, Frame::from_csv_str(&csv).unwrap()).unwrap();

        let mut expected = HashMap::new();
        expected.insert("flag".to_string(), Some("A".to_string()));
        let id = fingerprint(&expected, &["flag"]).unwrap();
        assert_eq!(frame.get(0, "flag_id"), Some(id.to_string().as_str()));
    }

    #[test]
    fn test_null_business_key_yields_null_fk() {
        let csv = PRICES_CSV.replace("'4,", ",");
        let spec = fact("prices").unwrap();
        let frame = prepare(spec, Frame::from_csv_str(&csv).unwrap()).unwrap();
        assert_eq!(frame.get(0, "area_code_id"), None);
        // The other keys still resolve.
        assert!(frame.get(0, "item_code_id").is_some());
    }

    // -------------------------------------------------------------------------
    // REFERENCE/FACT KEY AGREEMENT - the load-without-lookup contract
    // -------------------------------------------------------------------------

    #[test]
    fn test_fact_fk_matches_reference_id() {
        // The reference side loads area 4 harvested for the prices dataset;
        // the fact side must derive exactly that id from its own CSV.
        let dim = dimension("area_codes").unwrap();
        let ref_csv = "Area Code,Area,Area Code (M49),source_dataset\n'4,Algeria,'012,prices\n";
        let ref_frame = clean_reference(dim, Frame::from_csv_str(ref_csv).unwrap()).unwrap();
        let records = build_records(dim, &ref_frame);
        assert_eq!(records.len(), 1);

        let fact_frame = prepared_prices();
        assert_eq!(
            fact_frame.get(0, "area_code_id"),
            Some(records[0].id.to_string().as_str())
        );
    }

    #[test]
    fn test_fact_fk_matches_reference_id_for_flags() {
        let dim = dimension("flags").unwrap();
        let ref_csv = "Flag,Description\na,Official figure\n";
        let ref_frame = clean_reference(dim, Frame::from_csv_str(ref_csv).unwrap()).unwrap();
        let records = build_records(dim, &ref_frame);

        let fact_frame = prepared_prices();
        assert_eq!(
            fact_frame.get(0, "flag_id"),
            Some(records[0].id.to_string().as_str())
        );
    }

    // -------------------------------------------------------------------------
    // CLEANING INTERACTIONS
    // -------------------------------------------------------------------------

    #[test]
    fn test_value_sentinel_maps_to_half_detection_limit() {
        let csv = PRICES_CSV.replace("123.45", "<0.1");
        let spec = fact("prices").unwrap();
        let frame = prepare(spec, Frame::from_csv_str(&csv).unwrap()).unwrap();
        assert_eq!(frame.get(0, "value"), Some("0.05"));
        assert_eq!(coerce_float(frame.get(0, "value").unwrap()), Some(0.05));
    }

    #[test]
    fn test_prepare_dedups_after_fk_derivation() {
        let mut csv = PRICES_CSV.to_string();
        csv.push_str("'4,'012,Algeria,'0111,'F0111,Wheat,5532,Producer Price (USD/tonne),7021,Annual value,2015,2015,USD,123.45,A\n");
        let spec = fact("prices").unwrap();
        let frame = prepare(spec, Frame::from_csv_str(&csv).unwrap()).unwrap();
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn test_prepare_determinism() {
        let a = prepared_prices();
        let b = prepared_prices();
        assert_eq!(a.len(), b.len());
        assert_eq!(a.columns(), b.columns());
        for i in 0..a.len() {
            assert_eq!(a.row_map(i), b.row_map(i));
        }
    }

    // -------------------------------------------------------------------------
    // CHUNKING
    // -------------------------------------------------------------------------

    #[test]
    fn test_chunk_bounds_cover_everything_once() {
        let bounds = chunk_bounds(10, 0, 4);
        assert_eq!(bounds, vec![(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn test_chunk_bounds_resume_mid_stream() {
        let bounds = chunk_bounds(10, 8, 4);
        assert_eq!(bounds, vec![(8, 10)]);
    }

    #[test]
    fn test_chunk_bounds_resume_at_end_is_empty() {
        assert!(chunk_bounds(10, 10, 4).is_empty());
    }

    #[test]
    fn test_resume_covers_identical_tail() {
        // Chunks after a kill at chunk k are exactly the chunks a clean run
        // would have emitted from that offset.
        let full = chunk_bounds(100, 0, 30);
        let resumed = chunk_bounds(100, 60, 30);
        assert_eq!(&full[2..], resumed.as_slice());
    }
}
