//! Generic table endpoints
//!
//! One handler pair serves every dimension and dataset table: filtered,
//! sorted, projected pages plus grouped aggregation for dataset tables.
//! Rows decode into JSON through a column plan derived from the registry,
//! never by sniffing Postgres types per cell.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::envelope::{self, Envelope, Meta};
use crate::error::ApiError;
use crate::params::{
    parse_aggregate_query, parse_table_query, AggFunc, AggregateQuery, TableQuery,
};
use crate::registry::{ColKind, Registry, TableDef};
use crate::sqlgen;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub registry: Registry,
}

/// Column name plus the kind to decode it as.
pub type DecodePlan = Vec<(String, ColKind)>;

/// Decode plan for a plain select: the projected columns.
pub fn select_plan(table: &TableDef, query: &TableQuery) -> DecodePlan {
    sqlgen::projection(table, query)
        .into_iter()
        .map(|name| {
            let kind = table.column(&name).map(|c| c.kind).unwrap_or(ColKind::Text);
            (name, kind)
        })
        .collect()
}

/// Decode plan for an aggregate: group columns keep their registry kinds;
/// count aggregates come back bigint, everything else double precision.
pub fn aggregate_plan(table: &TableDef, query: &AggregateQuery) -> DecodePlan {
    let mut plan: DecodePlan = query
        .group_by
        .iter()
        .map(|name| {
            let kind = table.column(name).map(|c| c.kind).unwrap_or(ColKind::Text);
            (name.clone(), kind)
        })
        .collect();
    for agg in &query.aggs {
        let kind = match agg.func {
            AggFunc::Count | AggFunc::CountDistinct => ColKind::I64,
            _ => ColKind::F64,
        };
        plan.push((agg.alias.clone(), kind));
    }
    plan
}

fn decode_rows(rows: &[PgRow], plan: &DecodePlan) -> Result<serde_json::Value, ApiError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut object = serde_json::Map::with_capacity(plan.len());
        for (name, kind) in plan {
            let value = match kind {
                ColKind::I64 => row
                    .try_get::<Option<i64>, _>(name.as_str())?
                    .map_or(serde_json::Value::Null, |v| v.into()),
                ColKind::I32 => row
                    .try_get::<Option<i32>, _>(name.as_str())?
                    .map_or(serde_json::Value::Null, |v| v.into()),
                ColKind::F64 => row
                    .try_get::<Option<f64>, _>(name.as_str())?
                    .map_or(serde_json::Value::Null, |v| v.into()),
                ColKind::Text => row
                    .try_get::<Option<String>, _>(name.as_str())?
                    .map_or(serde_json::Value::Null, |v| v.into()),
                ColKind::Timestamptz => row
                    .try_get::<Option<DateTime<Utc>>, _>(name.as_str())?
                    .map_or(serde_json::Value::Null, |v| v.to_rfc3339().into()),
            };
            object.insert(name.clone(), value);
        }
        out.push(serde_json::Value::Object(object));
    }
    Ok(serde_json::Value::Array(out))
}

async fn fetch_total(state: &AppState, built: &sqlgen::BuiltQuery) -> Result<i64, ApiError> {
    let row = sqlgen::apply_binds(sqlx::query(&built.sql), &built.binds)
        .fetch_one(&state.pool)
        .await?;
    Ok(row.try_get::<i64, _>(0)?)
}

fn respond(
    table: &str,
    path: String,
    params: &HashMap<String, String>,
    data: serde_json::Value,
    total: i64,
    limit: i64,
    offset: i64,
    started: Instant,
) -> Response {
    let pagination = envelope::pagination(total, limit, offset);
    let links = envelope::links(&path, params, total, limit, offset);
    let headers = envelope::headers(&pagination, &links);
    let body = Envelope {
        data,
        pagination,
        links,
        meta: Meta {
            table: table.to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        },
    };
    (headers, Json(body)).into_response()
}

/// GET /tables - the queryable surface.
pub async fn list_tables(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tables: Vec<serde_json::Value> = state
        .registry
        .table_names()
        .into_iter()
        .filter_map(|name| state.registry.table(name))
        .map(|def| {
            serde_json::json!({
                "name": def.name,
                "kind": if def.is_dataset { "dataset" } else { "dimension" },
            })
        })
        .collect();
    Json(serde_json::json!({ "tables": tables }))
}

/// GET /tables/{table} - filtered, sorted, projected page.
pub async fn get_table(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let def = state
        .registry
        .table(&table)
        .ok_or_else(|| ApiError::TableNotFound(table.clone()))?;

    let query = parse_table_query(&params, def)?;
    let total = fetch_total(&state, &sqlgen::build_count(def, &query)?).await?;

    let built = sqlgen::build_select(def, &query)?;
    let rows = sqlgen::apply_binds(sqlx::query(&built.sql), &built.binds)
        .fetch_all(&state.pool)
        .await?;
    if rows.is_empty() {
        return Err(ApiError::NoDataFound);
    }

    let data = decode_rows(&rows, &select_plan(def, &query))?;
    Ok(respond(
        &table,
        format!("/tables/{}", table),
        &params,
        data,
        total,
        query.limit,
        query.offset,
        started,
    ))
}

/// GET /tables/{table}/aggregate - grouped aggregation, dataset tables only.
pub async fn get_aggregate(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let def = state
        .registry
        .table(&table)
        .ok_or_else(|| ApiError::TableNotFound(table.clone()))?;
    if !def.is_dataset {
        return Err(ApiError::InvalidParameter(format!(
            "'{}' is a dimension table; aggregation applies to dataset tables",
            table
        )));
    }

    let query = parse_aggregate_query(&params, def)?;
    let total = fetch_total(&state, &sqlgen::build_aggregate_count(def, &query)?).await?;

    let built = sqlgen::build_aggregate(def, &query)?;
    let rows = sqlgen::apply_binds(sqlx::query(&built.sql), &built.binds)
        .fetch_all(&state.pool)
        .await?;
    if rows.is_empty() {
        return Err(ApiError::NoDataFound);
    }

    let data = decode_rows(&rows, &aggregate_plan(def, &query))?;
    Ok(respond(
        &table,
        format!("/tables/{}/aggregate", table),
        &params,
        data,
        total,
        query.limit,
        query.offset,
        started,
    ))
}

// =============================================================================
// TESTS
// =============================================================================
