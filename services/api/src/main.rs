//! API Service - HTTP query surface over the FAO datastore
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /tables - List queryable tables
//! - GET /tables/{table} - Filter / sort / project / paginate any table
//! - GET /tables/{table}/aggregate - Grouped aggregation (dataset tables)
//! - GET /market-integration/correlations - Pairwise price correlations
//! - GET /market-integration/comparison - Converted price time series
//! - GET /market-integration/items - Items with price data
//! - GET /market-integration/available-countries - Areas with price data

use anyhow::Context;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

mod envelope;
mod error;
mod handlers;
mod market;
mod params;
mod registry;
mod sqlgen;

use handlers::AppState;
use registry::Registry;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    println!("=== FAO Datastore API ===");
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await
        .context("Failed to connect to database")?;

    let registry = Registry::load(&pool)
        .await
        .context("Failed to load table registry")?;
    println!("Registry: {} queryable table(s)", registry.table_names().len());

    let state = Arc::new(AppState { pool, registry });

    // Public read-only surface; open CORS.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/tables", get(handlers::list_tables))
        .route("/tables/:table", get(handlers::get_table))
        .route("/tables/:table/aggregate", get(handlers::get_aggregate))
        .route("/market-integration/correlations", get(market::correlations))
        .route("/market-integration/comparison", get(market::comparison))
        .route("/market-integration/items", get(market::items))
        .route(
            "/market-integration/available-countries",
            get(market::available_countries),
        )
        .layer(cors)
        .with_state(state);

    println!("API listening on http://{}", bind);
    println!("\nEndpoints:");
    println!("  GET /health");
    println!("  GET /tables");
    println!("  GET /tables/{{table}}?col=&col__in=&col__like=&col__gte=&col__lte=&fields=&sort=&limit=&offset=");
    println!("  GET /tables/{{table}}/aggregate?group_by=&aggregations=field:function[:alias][:round]");
    println!("  GET /market-integration/correlations?item_code=&element_code=&year_start=&area_codes=");
    println!("  GET /market-integration/comparison?item_code=&element_code=&year_start=&area_codes=");
    println!("  GET /market-integration/items");
    println!("  GET /market-integration/available-countries");

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
