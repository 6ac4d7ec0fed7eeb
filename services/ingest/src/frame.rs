//! In-memory tabular frame and the common CSV cleaner
//!
//! Every pipeline starts by loading its CSV into a Frame and running the
//! same cleaning sequence:
//! - sentinel null strings become real nulls
//! - declared code columns lose surrounding whitespace and single quotes
//! - declared numeric columns map the FAO literal "<0.1" to 0.05
//! - exact-duplicate rows are dropped, first occurrence wins
//!
//! Cleaning is DETERMINISTIC and order-preserving: resume offsets count rows
//! of the cleaned frame, so the same file must clean to the same frame on
//! every run.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::fingerprint::normalize;

/// String sentinels that FAO exports use for missing values.
const NULL_SENTINELS: &[&str] = &["nan", "NaN", "NAN"];

#[derive(Debug, Clone)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Frame {
    /// Load a CSV file. FAO bundles are not uniformly UTF-8: decode as UTF-8
    /// and fall back to Windows-1252 when the bytes are not valid UTF-8.
    pub fn from_csv_path(path: &Path) -> Result<Frame> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("INPUT_MISSING: cannot read {}", path.display()))?;

        let (text, _, had_errors) = encoding_rs::UTF_8.decode(&bytes);
        let text = if had_errors {
            encoding_rs::WINDOWS_1252.decode(&bytes).0
        } else {
            text
        };

        Frame::from_csv_str(&text)
            .with_context(|| format!("CLEAN_FAILURE: cannot parse {}", path.display()))
    }

    /// Parse CSV text into a frame. Empty cells load as null straight away.
    pub fn from_csv_str(content: &str) -> Result<Frame> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .context("no header row")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("malformed CSV record")?;
            let mut row: Vec<Option<String>> = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                row.push(match record.get(i) {
                    Some("") | None => None,
                    Some(v) => Some(v.to_string()),
                });
            }
            rows.push(row);
        }

        Ok(Frame { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Replace sentinel null strings with real nulls, all columns.
    pub fn apply_sentinel_nulls(&mut self) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                if let Some(v) = cell {
                    if v.is_empty() || NULL_SENTINELS.contains(&v.as_str()) {
                        *cell = None;
                    }
                }
            }
        }
    }

    /// Rename columns per a declared {old -> new} map. Unknown old names are
    /// ignored: a dataset revision that drops a column must not abort here
    /// (the missing column surfaces as nulls downstream).
    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) {
        for (old, new) in renames {
            if let Some(idx) = self.column_index(old) {
                self.columns[idx] = new.to_string();
            }
        }
    }

    /// Strip surrounding whitespace and single quotes on the named columns,
    /// with the same normalization the fingerprint applies.
    pub fn strip_codes(&mut self, columns: &[&str]) {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        for row in &mut self.rows {
            for &idx in &indices {
                if let Some(Some(v)) = row.get_mut(idx).map(|c| c.take()) {
                    let stripped = normalize(&v);
                    row[idx] = if stripped.is_empty() {
                        None
                    } else {
                        Some(stripped.to_string())
                    };
                }
            }
        }
    }

    /// Map the FAO below-detection literal on the named numeric columns.
    /// Actual float coercion happens at record-build time via coerce_float.
    pub fn map_numeric_sentinels(&mut self, columns: &[&str]) {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        for row in &mut self.rows {
            for &idx in &indices {
                if let Some(v) = &row[idx] {
                    if v.trim() == "<0.1" {
                        row[idx] = Some("0.05".to_string());
                    }
                }
            }
        }
    }

    /// Append a computed column. The value vector must match the row count.
    pub fn add_column(&mut self, name: &str, values: Vec<Option<String>>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Drop the named columns if present.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let drop: HashSet<usize> = names
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        if drop.is_empty() {
            return;
        }
        self.columns = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| !drop.contains(i))
            .map(|(_, c)| c.clone())
            .collect();
        for row in &mut self.rows {
            let mut kept = Vec::with_capacity(row.len() - drop.len());
            for (i, cell) in row.drain(..).enumerate() {
                if !drop.contains(&i) {
                    kept.push(cell);
                }
            }
            *row = kept;
        }
    }

    /// Drop rows whose value in `column` is null.
    pub fn drop_rows_where_null(&mut self, column: &str) {
        if let Some(idx) = self.column_index(column) {
            self.rows.retain(|row| row[idx].is_some());
        }
    }

    /// Drop exact-duplicate rows over all retained columns. First occurrence
    /// wins; input order is preserved (resume depends on stable row order).
    pub fn dedup_rows(&mut self) {
        let mut seen: HashSet<Vec<Option<String>>> = HashSet::with_capacity(self.rows.len());
        self.rows.retain(|row| seen.insert(row.clone()));
    }

    /// Materialize one row as a column-name -> value map.
    pub fn row_map(&self, row: usize) -> HashMap<String, Option<String>> {
        self.columns
            .iter()
            .cloned()
            .zip(self.rows[row].iter().cloned())
            .collect()
    }

    /// Set a single cell (used by FK derivation).
    pub fn set(&mut self, row: usize, column_idx: usize, value: Option<String>) {
        self.rows[row][column_idx] = value;
    }

    pub fn cell(&self, row: usize, column_idx: usize) -> Option<&str> {
        self.rows[row][column_idx].as_deref()
    }
}

/// Coerce a cleaned cell to a float. "<0.1" was already mapped to "0.05" by
/// the cleaner; anything unparseable becomes null rather than an error.
pub fn coerce_float(value: &str) -> Option<f64> {
    let v = value.trim();
    if v == "<0.1" {
        return Some(0.05);
    }
    v.parse::<f64>().ok()
}

/// Coerce a cleaned cell to an integer, tolerating float-formatted years
/// ("2015.0") that some FAO exports produce.
pub fn coerce_int(value: &str) -> Option<i32> {
    let v = value.trim();
    if let Ok(i) = v.parse::<i32>() {
        return Some(i);
    }
    v.parse::<f64>().ok().map(|f| f as i32)
}

// =============================================================================
// TESTS
// =============================================================================
