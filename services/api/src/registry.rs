//! Queryable-table registry
//!
//! Built at startup from information_schema, so the whitelist of tables and
//! columns always matches what the ingest service actually created. Every
//! dynamic SQL fragment the API emits is checked against this registry;
//! nothing user-supplied ever reaches the SQL text unvalidated.

use anyhow::Result;
use sqlx::PgPool;
use std::collections::HashMap;

/// Postgres column types the API knows how to read and filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColKind {
    I64,
    I32,
    F64,
    Text,
    Timestamptz,
}

impl ColKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColKind::I64 | ColKind::I32 | ColKind::F64)
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub kind: ColKind,
}

#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<Column>,
    /// Dataset tables carry measurements and accept /aggregate.
    pub is_dataset: bool,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    tables: HashMap<String, TableDef>,
}

/// Tables that exist for the ingest service's own bookkeeping.
const INTERNAL_TABLES: &[&str] = &["pipeline_progress"];

impl Registry {
    pub async fn load(pool: &PgPool) -> Result<Registry> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT table_name::text, column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(Registry::build(rows))
    }

    /// Assemble the registry from (table, column, data_type) triples.
    pub fn build(rows: Vec<(String, String, String)>) -> Registry {
        let mut tables: HashMap<String, TableDef> = HashMap::new();
        for (table, column, data_type) in rows {
            if INTERNAL_TABLES.contains(&table.as_str()) {
                continue;
            }
            let Some(kind) = classify(&data_type) else {
                continue;
            };
            tables
                .entry(table.clone())
                .or_insert_with(|| TableDef {
                    name: table.clone(),
                    columns: Vec::new(),
                    is_dataset: false,
                })
                .columns
                .push(Column { name: column, kind });
        }
        for def in tables.values_mut() {
            def.is_dataset = def.column("value").is_some();
        }
        Registry { tables }
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

fn classify(data_type: &str) -> Option<ColKind> {
    match data_type {
        "bigint" => Some(ColKind::I64),
        "integer" | "smallint" => Some(ColKind::I32),
        "double precision" | "real" | "numeric" => Some(ColKind::F64),
        "text" | "character varying" => Some(ColKind::Text),
        "timestamp with time zone" => Some(ColKind::Timestamptz),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================
