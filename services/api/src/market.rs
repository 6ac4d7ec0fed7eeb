//! Market-integration analytics
//!
//! For a commodity and a small set of areas, measures how tightly producer
//! prices move together: for every unordered pair of areas, the overlapping
//! annual official-figure price series, dispersion statistics of the price
//! ratio, and the Pearson correlation of year-over-year returns. Local-
//! currency prices are converted to USD through the exchange_rate dataset
//! before any pair math.
//!
//! The SQL returns per-area series; the correlation and ratio math runs
//! here, after the query.

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;
use sqlx::Row;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::ApiError;
use crate::handlers::AppState;

/// Producer price in local currency units.
const ELEMENT_LCU: &str = "5530";
/// Producer price in USD.
const ELEMENT_USD: &str = "5532";
/// FAO months code for the annual value.
const ANNUAL_MONTHS_CODE: &str = "7021";
/// Official figure data-quality flag.
const OFFICIAL_FLAG: &str = "A";
/// Earliest FAO reporting year; default series start.
const DEFAULT_YEAR_START: i32 = 1961;

const MAX_AREAS: usize = 4;
const MIN_AREAS: usize = 2;

const CORRELATION_HIGH: f64 = 0.67;
const CORRELATION_MODERATE: f64 = 0.33;
/// Ratio-dispersion buckets use the coefficient of variation.
const RATIO_CV_HIGH: f64 = 0.10;
const RATIO_CV_MODERATE: f64 = 0.25;

// =============================================================================
// Pure series math
// =============================================================================

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0.0 below two observations.
fn sample_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Year-over-year relative returns of consecutive series points.
pub fn yoy_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Pearson correlation coefficient. None when undefined: mismatched or
/// too-short inputs, or a constant series (zero variance).
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mx = mean(x);
    let my = mean(y);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    let denom = (vx / n).sqrt() * (vy / n).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some((cov / n) / denom)
}

pub fn correlation_bucket(r: f64) -> &'static str {
    if r > CORRELATION_HIGH {
        "high"
    } else if r > CORRELATION_MODERATE {
        "moderate"
    } else {
        "none"
    }
}

pub fn ratio_bucket(ratio_mean: f64, volatility: f64) -> &'static str {
    if ratio_mean == 0.0 {
        return "none";
    }
    let cv = volatility / ratio_mean.abs();
    if cv < RATIO_CV_HIGH {
        "high"
    } else if cv < RATIO_CV_MODERATE {
        "moderate"
    } else {
        "none"
    }
}

// =============================================================================
// Pair computation
// =============================================================================

#[derive(Debug, Serialize)]
pub struct PairPoint {
    pub year: i32,
    pub price_a: f64,
    pub price_b: f64,
}

#[derive(Debug, Serialize)]
pub struct RatioStats {
    pub mean: f64,
    pub volatility: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Serialize)]
pub struct PairResult {
    pub area_a: String,
    pub area_b: String,
    pub years_compared: usize,
    pub series: Vec<PairPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<RatioStats>,
    pub ratio_integration_level: &'static str,
    /// Null when the overlap is too short; level says insufficient_data.
    pub correlation: Option<f64>,
    pub correlation_integration_level: &'static str,
}

type Series = BTreeMap<i32, f64>;

/// All pairwise statistics for one unordered area pair.
pub fn compute_pair(area_a: &str, area_b: &str, sa: &Series, sb: &Series) -> PairResult {
    // Overlapping years with a usable price on both sides; non-positive
    // prices cannot form ratios or returns.
    let series: Vec<PairPoint> = sa
        .iter()
        .filter_map(|(year, &pa)| {
            let &pb = sb.get(year)?;
            (pa > 0.0 && pb > 0.0).then_some(PairPoint {
                year: *year,
                price_a: pa,
                price_b: pb,
            })
        })
        .collect();

    let ratios: Vec<f64> = series.iter().map(|p| p.price_a / p.price_b).collect();
    let (ratio, ratio_level) = if ratios.is_empty() {
        (None, "none")
    } else {
        let m = mean(&ratios);
        let volatility = sample_stddev(&ratios);
        let stats = RatioStats {
            mean: m,
            volatility,
            min: ratios.iter().cloned().fold(f64::INFINITY, f64::min),
            max: ratios.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        };
        let level = ratio_bucket(m, volatility);
        (Some(stats), level)
    };

    let returns_a = yoy_returns(&series.iter().map(|p| p.price_a).collect::<Vec<_>>());
    let returns_b = yoy_returns(&series.iter().map(|p| p.price_b).collect::<Vec<_>>());

    let (correlation, correlation_level) = if returns_a.len() < 2 {
        (None, "insufficient_data")
    } else {
        // A constant series leaves the coefficient undefined; coerce to 0.0.
        let r = pearson(&returns_a, &returns_b).unwrap_or(0.0);
        (Some(r), correlation_bucket(r))
    };

    PairResult {
        area_a: area_a.to_string(),
        area_b: area_b.to_string(),
        years_compared: series.len(),
        series,
        ratio,
        ratio_integration_level: ratio_level,
        correlation,
        correlation_integration_level: correlation_level,
    }
}

// =============================================================================
// Validation and data access
// =============================================================================

#[derive(Debug)]
struct Validated {
    item_code: String,
    element_code: String,
    area_codes: Vec<String>,
    year_start: i32,
}

async fn code_exists(
    state: &AppState,
    table: &str,
    column: &str,
    code: &str,
) -> Result<bool, ApiError> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = $1 AND source_dataset = 'prices')",
        table, column
    );
    let row = sqlx::query(&sql).bind(code).fetch_one(&state.pool).await?;
    Ok(row.try_get::<bool, _>(0)?)
}

async fn validate(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Validated, ApiError> {
    let item_code = params
        .get("item_code")
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingParameter("item_code"))?
        .clone();
    if !code_exists(state, "item_codes", "item_code", &item_code).await? {
        return Err(ApiError::InvalidItemCode(item_code));
    }

    let element_code = params
        .get("element_code")
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingParameter("element_code"))?
        .clone();
    if element_code != ELEMENT_LCU && element_code != ELEMENT_USD {
        return Err(ApiError::InvalidParameter(format!(
            "element_code must be {} (LCU) or {} (USD)",
            ELEMENT_LCU, ELEMENT_USD
        )));
    }
    if !code_exists(state, "elements", "element_code", &element_code).await? {
        return Err(ApiError::InvalidElementCode(element_code));
    }

    let raw_areas = params
        .get("area_codes")
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingParameter("area_codes"))?;
    let area_codes: Vec<String> = raw_areas
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if area_codes.len() < MIN_AREAS || area_codes.len() > MAX_AREAS {
        return Err(ApiError::InvalidParameter(format!(
            "area_codes must list between {} and {} areas",
            MIN_AREAS, MAX_AREAS
        )));
    }
    for code in &area_codes {
        if !code_exists(state, "area_codes", "area_code", code).await? {
            return Err(ApiError::InvalidAreaCode(code.clone()));
        }
    }

    let year_start = match params.get("year_start") {
        Some(v) => v.parse::<i32>().map_err(|_| {
            ApiError::InvalidParameter(format!("year_start '{}' is not a year", v))
        })?,
        None => DEFAULT_YEAR_START,
    };

    Ok(Validated {
        item_code,
        element_code,
        area_codes,
        year_start,
    })
}

/// Annual official-figure price series per area, in USD. LCU prices divide
/// by the area/year annual exchange rate; a year without a positive rate
/// drops out of the series.
async fn fetch_series(
    state: &AppState,
    v: &Validated,
) -> Result<HashMap<String, Series>, ApiError> {
    let sql = if v.element_code == ELEMENT_LCU {
        r#"
        SELECT a.area_code, p.year, p.value / fx.rate AS value
        FROM prices p
        JOIN area_codes a ON p.area_code_id = a.id
        JOIN item_codes i ON p.item_code_id = i.id
        JOIN elements e ON p.element_code_id = e.id
        JOIN flags f ON p.flag_id = f.id
        JOIN (
            SELECT ea.area_code, er.year, AVG(er.value) AS rate
            FROM exchange_rate er
            JOIN area_codes ea ON er.area_code_id = ea.id
            WHERE er.months_code = $5 AND er.value > 0 AND er.year IS NOT NULL
            GROUP BY ea.area_code, er.year
        ) fx ON fx.area_code = a.area_code AND fx.year = p.year
        WHERE i.item_code = $1
          AND e.element_code = $2
          AND a.area_code = ANY($3)
          AND p.year >= $4
          AND p.months_code = $5
          AND f.flag = $6
          AND p.value IS NOT NULL
          AND p.year IS NOT NULL
        ORDER BY a.area_code, p.year
        "#
    } else {
        r#"
        SELECT a.area_code, p.year, p.value
        FROM prices p
        JOIN area_codes a ON p.area_code_id = a.id
        JOIN item_codes i ON p.item_code_id = i.id
        JOIN elements e ON p.element_code_id = e.id
        JOIN flags f ON p.flag_id = f.id
        WHERE i.item_code = $1
          AND e.element_code = $2
          AND a.area_code = ANY($3)
          AND p.year >= $4
          AND p.months_code = $5
          AND f.flag = $6
          AND p.value IS NOT NULL
          AND p.year IS NOT NULL
        ORDER BY a.area_code, p.year
        "#
    };

    let rows: Vec<(String, i32, f64)> = sqlx::query_as(sql)
        .bind(&v.item_code)
        .bind(&v.element_code)
        .bind(&v.area_codes)
        .bind(v.year_start)
        .bind(ANNUAL_MONTHS_CODE)
        .bind(OFFICIAL_FLAG)
        .fetch_all(&state.pool)
        .await?;

    let mut series: HashMap<String, Series> = HashMap::new();
    for (area, year, value) in rows {
        series.entry(area).or_default().insert(year, value);
    }
    Ok(series)
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Serialize)]
pub struct CorrelationsResponse {
    pub item_code: String,
    pub element_code: String,
    pub year_start: i32,
    pub pairs: Vec<PairResult>,
}

/// GET /market-integration/correlations
pub async fn correlations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<CorrelationsResponse>, ApiError> {
    let v = validate(&state, &params).await?;
    let series = fetch_series(&state, &v).await?;
    if series.values().all(|s| s.is_empty()) {
        return Err(ApiError::NoDataFound);
    }

    static EMPTY: Series = Series::new();
    let mut pairs = Vec::new();
    for i in 0..v.area_codes.len() {
        for j in (i + 1)..v.area_codes.len() {
            let a = &v.area_codes[i];
            let b = &v.area_codes[j];
            let sa = series.get(a).unwrap_or(&EMPTY);
            let sb = series.get(b).unwrap_or(&EMPTY);
            pairs.push(compute_pair(a, b, sa, sb));
        }
    }

    Ok(Json(CorrelationsResponse {
        item_code: v.item_code,
        element_code: v.element_code,
        year_start: v.year_start,
        pairs,
    }))
}

#[derive(Serialize)]
pub struct AreaSeries {
    pub area_code: String,
    pub points: Vec<SeriesPoint>,
}

#[derive(Serialize)]
pub struct SeriesPoint {
    pub year: i32,
    pub price: f64,
}

#[derive(Serialize)]
pub struct ComparisonResponse {
    pub item_code: String,
    pub element_code: String,
    pub year_start: i32,
    pub series: Vec<AreaSeries>,
}

/// GET /market-integration/comparison - one converted price line per area.
pub async fn comparison(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ComparisonResponse>, ApiError> {
    let v = validate(&state, &params).await?;
    let mut by_area = fetch_series(&state, &v).await?;
    if by_area.values().all(|s| s.is_empty()) {
        return Err(ApiError::NoDataFound);
    }

    let series = v
        .area_codes
        .iter()
        .map(|code| AreaSeries {
            area_code: code.clone(),
            points: by_area
                .remove(code)
                .unwrap_or_default()
                .into_iter()
                .map(|(year, price)| SeriesPoint { year, price })
                .collect(),
        })
        .collect();

    Ok(Json(ComparisonResponse {
        item_code: v.item_code,
        element_code: v.element_code,
        year_start: v.year_start,
        series,
    }))
}

/// GET /market-integration/items - items that actually have price data.
pub async fn items(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT DISTINCT i.item_code, i.item
        FROM prices p
        JOIN item_codes i ON p.item_code_id = i.id
        ORDER BY i.item_code
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(code, name)| serde_json::json!({ "item_code": code, "item": name }))
        .collect();
    Ok(Json(serde_json::json!({ "items": items })))
}

/// GET /market-integration/available-countries
pub async fn available_countries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT DISTINCT a.area_code, a.area
        FROM prices p
        JOIN area_codes a ON p.area_code_id = a.id
        ORDER BY a.area_code
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let countries: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(code, name)| serde_json::json!({ "area_code": code, "area": name }))
        .collect();
    Ok(Json(serde_json::json!({ "countries": countries })))
}

// =============================================================================
// TESTS - the arithmetic contract
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(i32, f64)]) -> Series {
        points.iter().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // PEARSON
    // -------------------------------------------------------------------------

    #[test]
    fn test_pearson_perfect_positive() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&x, &y).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_perfect_negative() {
        let x = [1.0, 2.0, 3.0];
        let y = [3.0, 2.0, 1.0];
        assert!((pearson(&x, &y).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_constant_series_is_undefined() {
        let x = [1.0, 1.0, 1.0];
        let y = [1.0, 2.0, 3.0];
        assert_eq!(pearson(&x, &y), None);
    }

    #[test]
    fn test_pearson_too_short_is_undefined() {
        assert_eq!(pearson(&[1.0], &[2.0]), None);
    }

    // -------------------------------------------------------------------------
    // RETURNS AND BUCKETS
    // -------------------------------------------------------------------------

    #[test]
    fn test_yoy_returns() {
        let r = yoy_returns(&[100.0, 110.0, 99.0]);
        assert!((r[0] - 0.10).abs() < 1e-12);
        assert!((r[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_buckets() {
        assert_eq!(correlation_bucket(0.9), "high");
        assert_eq!(correlation_bucket(0.67), "moderate");
        assert_eq!(correlation_bucket(0.5), "moderate");
        assert_eq!(correlation_bucket(0.33), "none");
        assert_eq!(correlation_bucket(0.0), "none");
        assert_eq!(correlation_bucket(-0.8), "none");
    }

    #[test]
    fn test_ratio_buckets_by_coefficient_of_variation() {
        assert_eq!(ratio_bucket(2.0, 0.1), "high");
        assert_eq!(ratio_bucket(2.0, 0.4), "moderate");
        assert_eq!(ratio_bucket(2.0, 0.6), "none");
        assert_eq!(ratio_bucket(0.0, 0.0), "none");
    }

    // -------------------------------------------------------------------------
    // PAIR COMPUTATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_pair_flat_series_coerces_correlation_to_zero() {
        // Both series constant: every return is zero, variance is zero, the
        // coefficient is undefined and comes back as 0.0.
        let sa = series(&[(2010, 5.0), (2011, 5.0), (2012, 5.0), (2013, 5.0)]);
        let sb = series(&[(2010, 7.0), (2011, 7.0), (2012, 7.0), (2013, 7.0)]);
        let pair = compute_pair("4", "59", &sa, &sb);
        assert_eq!(pair.correlation, Some(0.0));
        assert_eq!(pair.correlation_integration_level, "none");
    }

    #[test]
    fn test_pair_comoving_series_correlates_fully() {
        // One series a positive scaling of the other: identical returns,
        // correlation 1.0, high integration.
        let sa = series(&[(2010, 100.0), (2011, 110.0), (2012, 95.0), (2013, 130.0), (2014, 140.0)]);
        let sb = series(&[(2010, 200.0), (2011, 220.0), (2012, 190.0), (2013, 260.0), (2014, 280.0)]);
        let pair = compute_pair("4", "59", &sa, &sb);

        assert_eq!(pair.years_compared, 5);
        assert!((pair.correlation.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(pair.correlation_integration_level, "high");

        // The ratio is a constant 0.5: zero volatility, high integration.
        let ratio = pair.ratio.unwrap();
        assert!((ratio.mean - 0.5).abs() < 1e-12);
        assert!(ratio.volatility.abs() < 1e-12);
        assert!((ratio.min - 0.5).abs() < 1e-12);
        assert!((ratio.max - 0.5).abs() < 1e-12);
        assert_eq!(pair.ratio_integration_level, "high");
    }

    #[test]
    fn test_pair_only_overlapping_years_count() {
        let sa = series(&[(2010, 10.0), (2011, 11.0), (2012, 12.0)]);
        let sb = series(&[(2011, 20.0), (2012, 21.0), (2013, 22.0)]);
        let pair = compute_pair("4", "59", &sa, &sb);
        assert_eq!(pair.years_compared, 2);
        assert_eq!(pair.series[0].year, 2011);
        assert_eq!(pair.series[1].year, 2012);
    }

    #[test]
    fn test_pair_short_overlap_is_insufficient() {
        // Two common years produce one return pair; the coefficient needs
        // two.
        let sa = series(&[(2010, 10.0), (2011, 11.0)]);
        let sb = series(&[(2010, 20.0), (2011, 21.0)]);
        let pair = compute_pair("4", "59", &sa, &sb);
        assert_eq!(pair.correlation, None);
        assert_eq!(pair.correlation_integration_level, "insufficient_data");
        // Ratio statistics still exist over the overlap.
        assert!(pair.ratio.is_some());
    }

    #[test]
    fn test_pair_no_overlap() {
        let sa = series(&[(2010, 10.0)]);
        let sb = series(&[(2012, 20.0)]);
        let pair = compute_pair("4", "59", &sa, &sb);
        assert_eq!(pair.years_compared, 0);
        assert!(pair.ratio.is_none());
        assert_eq!(pair.correlation_integration_level, "insufficient_data");
    }

    #[test]
    fn test_pair_ignores_non_positive_prices() {
        let sa = series(&[(2010, 10.0), (2011, 0.0), (2012, 12.0)]);
        let sb = series(&[(2010, 20.0), (2011, 21.0), (2012, 24.0)]);
        let pair = compute_pair("4", "59", &sa, &sb);
        assert_eq!(pair.years_compared, 2);
    }

    #[test]
    fn test_pair_correlation_stays_in_unit_interval() {
        let sa = series(&[
            (2010, 100.0),
            (2011, 140.0),
            (2012, 90.0),
            (2013, 160.0),
            (2014, 120.0),
        ]);
        let sb = series(&[
            (2010, 55.0),
            (2011, 60.0),
            (2012, 52.0),
            (2013, 70.0),
            (2014, 66.0),
        ]);
        let pair = compute_pair("4", "59", &sa, &sb);
        let r = pair.correlation.unwrap();
        assert!((-1.0..=1.0).contains(&r));
        // Volatility is the sample stddev of the per-year ratios.
        let ratios: Vec<f64> = pair.series.iter().map(|p| p.price_a / p.price_b).collect();
        assert!((pair.ratio.unwrap().volatility - sample_stddev(&ratios)).abs() < 1e-12);
    }
}
