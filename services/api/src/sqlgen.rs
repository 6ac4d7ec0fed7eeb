//! Dynamic SQL generation
//!
//! Builds parameterized SELECTs from validated query descriptions. Column
//! and table names come from the registry (never from user input); every
//! user-supplied value travels as a bind parameter. Surrogate ids are 63-bit
//! integers, so integer columns bind as i64 end to end; routing them
//! through f64 would corrupt them.

use crate::error::ApiError;
use crate::params::{AggFunc, AggregateQuery, Filter, FilterOp, TableQuery};
use crate::registry::{ColKind, TableDef};

/// A bind value with its Postgres-facing type.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    I64(i64),
    F64(f64),
    Text(String),
    I64List(Vec<i64>),
    F64List(Vec<f64>),
    TextList(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub binds: Vec<Bind>,
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::InvalidParameter(message.into())
}

fn parse_scalar(kind: ColKind, raw: &str, column: &str) -> Result<Bind, ApiError> {
    match kind {
        ColKind::I64 | ColKind::I32 => raw
            .trim()
            .parse::<i64>()
            .map(Bind::I64)
            .map_err(|_| invalid(format!("'{}' is not an integer for column '{}'", raw, column))),
        ColKind::F64 => raw
            .trim()
            .parse::<f64>()
            .map(Bind::F64)
            .map_err(|_| invalid(format!("'{}' is not a number for column '{}'", raw, column))),
        _ => Ok(Bind::Text(raw.to_string())),
    }
}

fn parse_list(kind: ColKind, raw: &str, column: &str) -> Result<Bind, ApiError> {
    let parts: Vec<&str> = raw.split(',').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Err(invalid(format!("empty value list for column '{}'", column)));
    }
    match kind {
        ColKind::I64 | ColKind::I32 => {
            let mut values = Vec::with_capacity(parts.len());
            for p in &parts {
                values.push(p.trim().parse::<i64>().map_err(|_| {
                    invalid(format!("'{}' is not an integer for column '{}'", p, column))
                })?);
            }
            Ok(Bind::I64List(values))
        }
        ColKind::F64 => {
            let mut values = Vec::with_capacity(parts.len());
            for p in &parts {
                values.push(p.trim().parse::<f64>().map_err(|_| {
                    invalid(format!("'{}' is not a number for column '{}'", p, column))
                })?);
            }
            Ok(Bind::F64List(values))
        }
        _ => Ok(Bind::TextList(parts.iter().map(|p| p.to_string()).collect())),
    }
}

/// Append WHERE conditions for the filters; returns the SQL fragment.
fn where_clause(
    table: &TableDef,
    filters: &[Filter],
    binds: &mut Vec<Bind>,
) -> Result<String, ApiError> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut conditions = Vec::with_capacity(filters.len());
    for filter in filters {
        // Parser already validated existence; look up the kind again for
        // value conversion.
        let kind = table
            .column(&filter.column)
            .map(|c| c.kind)
            .ok_or_else(|| invalid(format!("unknown column '{}'", filter.column)))?;

        let condition = match filter.op {
            FilterOp::Eq => {
                binds.push(parse_scalar(kind, &filter.raw, &filter.column)?);
                format!("{} = ${}", filter.column, binds.len())
            }
            FilterOp::In => {
                binds.push(parse_list(kind, &filter.raw, &filter.column)?);
                format!("{} = ANY(${})", filter.column, binds.len())
            }
            FilterOp::Like => {
                binds.push(Bind::Text(format!("%{}%", filter.raw)));
                format!("{} ILIKE ${}", filter.column, binds.len())
            }
            FilterOp::Gte => {
                binds.push(parse_scalar(kind, &filter.raw, &filter.column)?);
                format!("{} >= ${}", filter.column, binds.len())
            }
            FilterOp::Lte => {
                binds.push(parse_scalar(kind, &filter.raw, &filter.column)?);
                format!("{} <= ${}", filter.column, binds.len())
            }
        };
        conditions.push(condition);
    }
    Ok(format!(" WHERE {}", conditions.join(" AND ")))
}

/// Projection list: requested fields or every registry column.
pub fn projection(table: &TableDef, query: &TableQuery) -> Vec<String> {
    match &query.fields {
        Some(fields) => fields.clone(),
        None => table.columns.iter().map(|c| c.name.clone()).collect(),
    }
}

/// SELECT for one page of rows.
pub fn build_select(table: &TableDef, query: &TableQuery) -> Result<BuiltQuery, ApiError> {
    let mut binds = Vec::new();
    let columns = projection(table, query).join(", ");
    let mut sql = format!("SELECT {} FROM {}", columns, table.name);
    sql.push_str(&where_clause(table, &query.filters, &mut binds)?);

    let order = if query.sort.is_empty() {
        // Stable pagination needs a total order; every table has id.
        "id ASC".to_string()
    } else {
        query
            .sort
            .iter()
            .map(|(field, dir)| format!("{} {}", field, dir.sql()))
            .collect::<Vec<_>>()
            .join(", ")
    };
    sql.push_str(&format!(" ORDER BY {}", order));

    binds.push(Bind::I64(query.limit));
    sql.push_str(&format!(" LIMIT ${}", binds.len()));
    binds.push(Bind::I64(query.offset));
    sql.push_str(&format!(" OFFSET ${}", binds.len()));

    Ok(BuiltQuery { sql, binds })
}

/// COUNT(*) over the same filters, for pagination totals.
pub fn build_count(table: &TableDef, query: &TableQuery) -> Result<BuiltQuery, ApiError> {
    let mut binds = Vec::new();
    let mut sql = format!("SELECT COUNT(*) FROM {}", table.name);
    sql.push_str(&where_clause(table, &query.filters, &mut binds)?);
    Ok(BuiltQuery { sql, binds })
}

fn agg_expr(spec: &crate::params::AggSpec) -> String {
    let base = match spec.func {
        AggFunc::Sum => format!("SUM({})", spec.field),
        AggFunc::Avg => format!("AVG({})", spec.field),
        AggFunc::Min => format!("MIN({})", spec.field),
        AggFunc::Max => format!("MAX({})", spec.field),
        AggFunc::Count => format!("COUNT({})", spec.field),
        AggFunc::CountDistinct => format!("COUNT(DISTINCT {})", spec.field),
        AggFunc::Stddev => format!("STDDEV_SAMP({})", spec.field),
        AggFunc::Variance => format!("VAR_SAMP({})", spec.field),
        AggFunc::Median => format!(
            "PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY {})",
            spec.field
        ),
    };
    // Fixed output types keep row decoding uniform: counts come back as
    // bigint, everything else as double precision.
    match (spec.func, spec.round) {
        (AggFunc::Count | AggFunc::CountDistinct, _) => {
            format!("({})::bigint AS {}", base, spec.alias)
        }
        (_, Some(digits)) => format!(
            "ROUND(({})::numeric, {})::double precision AS {}",
            base, digits, spec.alias
        ),
        (_, None) => format!("({})::double precision AS {}", base, spec.alias),
    }
}

/// Grouped aggregation SELECT.
pub fn build_aggregate(table: &TableDef, query: &AggregateQuery) -> Result<BuiltQuery, ApiError> {
    let mut binds = Vec::new();

    let mut select_list: Vec<String> = query.group_by.clone();
    select_list.extend(query.aggs.iter().map(agg_expr));

    let mut sql = format!(
        "SELECT {} FROM {}",
        select_list.join(", "),
        table.name
    );
    sql.push_str(&where_clause(table, &query.filters, &mut binds)?);
    sql.push_str(&format!(" GROUP BY {}", query.group_by.join(", ")));
    sql.push_str(&format!(" ORDER BY {}", query.group_by.join(", ")));

    binds.push(Bind::I64(query.limit));
    sql.push_str(&format!(" LIMIT ${}", binds.len()));
    binds.push(Bind::I64(query.offset));
    sql.push_str(&format!(" OFFSET ${}", binds.len()));

    Ok(BuiltQuery { sql, binds })
}

/// COUNT of groups, for aggregate pagination totals.
pub fn build_aggregate_count(
    table: &TableDef,
    query: &AggregateQuery,
) -> Result<BuiltQuery, ApiError> {
    let mut binds = Vec::new();
    let mut inner = format!(
        "SELECT 1 FROM {}",
        table.name
    );
    inner.push_str(&where_clause(table, &query.filters, &mut binds)?);
    inner.push_str(&format!(" GROUP BY {}", query.group_by.join(", ")));
    let sql = format!("SELECT COUNT(*) FROM ({}) g", inner);
    Ok(BuiltQuery { sql, binds })
}

/// Attach binds to a sqlx query.
pub fn apply_binds<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for bind in binds {
        query = match bind {
            Bind::I64(v) => query.bind(v),
            Bind::F64(v) => query.bind(v),
            Bind::Text(v) => query.bind(v),
            Bind::I64List(v) => query.bind(v),
            Bind::F64List(v) => query.bind(v),
            Bind::TextList(v) => query.bind(v),
        };
    }
    query
}

// =============================================================================
// TESTS
// =============================================================================
