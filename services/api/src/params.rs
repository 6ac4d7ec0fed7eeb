//! Query-parameter parsing and validation
//!
//! Translates the flat query-string map into a validated query description
//! against a registry table. Unknown columns, malformed sorts and type
//! mismatches all fail here with INVALID_PARAMETER before any SQL is built.

use std::collections::HashMap;

use crate::error::ApiError;
use crate::registry::TableDef;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 10_000;

/// Keys that are not column filters.
const RESERVED: &[&str] = &["fields", "sort", "limit", "offset", "group_by", "aggregations"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    In,
    Like,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableQuery {
    pub filters: Vec<Filter>,
    pub fields: Option<Vec<String>>,
    pub sort: Vec<(String, SortDir)>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    Stddev,
    Variance,
    Median,
}

impl AggFunc {
    fn parse(name: &str) -> Option<AggFunc> {
        match name {
            "sum" => Some(AggFunc::Sum),
            "avg" => Some(AggFunc::Avg),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            "count" => Some(AggFunc::Count),
            "count_distinct" => Some(AggFunc::CountDistinct),
            "stddev" => Some(AggFunc::Stddev),
            "variance" => Some(AggFunc::Variance),
            "median" => Some(AggFunc::Median),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
            AggFunc::CountDistinct => "count_distinct",
            AggFunc::Stddev => "stddev",
            AggFunc::Variance => "variance",
            AggFunc::Median => "median",
        }
    }

    /// count/count_distinct work on any column; the rest need numbers.
    fn requires_numeric(&self) -> bool {
        !matches!(self, AggFunc::Count | AggFunc::CountDistinct)
    }
}

#[derive(Debug, Clone)]
pub struct AggSpec {
    pub field: String,
    pub func: AggFunc,
    pub alias: String,
    pub round: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub filters: Vec<Filter>,
    pub group_by: Vec<String>,
    pub aggs: Vec<AggSpec>,
    pub limit: i64,
    pub offset: i64,
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::InvalidParameter(message.into())
}

fn check_column<'t>(
    table: &'t TableDef,
    name: &str,
) -> Result<&'t crate::registry::Column, ApiError> {
    table
        .column(name)
        .ok_or_else(|| invalid(format!("unknown column '{}' on table '{}'", name, table.name)))
}

fn parse_filters(
    params: &HashMap<String, String>,
    table: &TableDef,
) -> Result<Vec<Filter>, ApiError> {
    let mut filters = Vec::new();
    // Deterministic order regardless of map iteration.
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();

    for key in keys {
        if RESERVED.contains(&key.as_str()) {
            continue;
        }
        let raw = params[key].clone();
        let (column, op) = if let Some(c) = key.strip_suffix("__in") {
            (c, FilterOp::In)
        } else if let Some(c) = key.strip_suffix("__like") {
            (c, FilterOp::Like)
        } else if let Some(c) = key.strip_suffix("__gte") {
            (c, FilterOp::Gte)
        } else if let Some(c) = key.strip_suffix("__lte") {
            (c, FilterOp::Lte)
        } else {
            (key.as_str(), FilterOp::Eq)
        };

        let def = check_column(table, column)?;
        match op {
            FilterOp::Like if def.kind != crate::registry::ColKind::Text => {
                return Err(invalid(format!(
                    "partial match needs a text column, '{}' is not",
                    column
                )));
            }
            FilterOp::Gte | FilterOp::Lte if !def.kind.is_numeric() => {
                return Err(invalid(format!(
                    "range filter needs a numeric column, '{}' is not",
                    column
                )));
            }
            _ => {}
        }

        filters.push(Filter {
            column: column.to_string(),
            op,
            raw,
        });
    }
    Ok(filters)
}

fn parse_limit_offset(params: &HashMap<String, String>) -> Result<(i64, i64), ApiError> {
    let limit = match params.get("limit") {
        Some(v) => v
            .parse::<i64>()
            .map_err(|_| invalid(format!("limit '{}' is not an integer", v)))?,
        None => DEFAULT_LIMIT,
    };
    if limit < 1 || limit > MAX_LIMIT {
        return Err(invalid(format!("limit must be between 1 and {}", MAX_LIMIT)));
    }
    let offset = match params.get("offset") {
        Some(v) => v
            .parse::<i64>()
            .map_err(|_| invalid(format!("offset '{}' is not an integer", v)))?,
        None => 0,
    };
    if offset < 0 {
        return Err(invalid("offset must not be negative"));
    }
    Ok((limit, offset))
}

fn parse_sort(
    params: &HashMap<String, String>,
    table: &TableDef,
) -> Result<Vec<(String, SortDir)>, ApiError> {
    let Some(raw) = params.get("sort") else {
        return Ok(Vec::new());
    };
    let mut sort = Vec::new();
    for part in raw.split(',').filter(|p| !p.is_empty()) {
        let (field, dir) = match part.split_once(':') {
            Some((f, "asc")) => (f, SortDir::Asc),
            Some((f, "desc")) => (f, SortDir::Desc),
            Some((_, other)) => {
                return Err(invalid(format!("sort direction '{}' is not asc|desc", other)));
            }
            None => (part, SortDir::Asc),
        };
        check_column(table, field)?;
        sort.push((field.to_string(), dir));
    }
    Ok(sort)
}

/// Parse and validate a plain table query.
pub fn parse_table_query(
    params: &HashMap<String, String>,
    table: &TableDef,
) -> Result<TableQuery, ApiError> {
    let fields = match params.get("fields") {
        Some(raw) => {
            let mut fields = Vec::new();
            for f in raw.split(',').filter(|f| !f.is_empty()) {
                check_column(table, f)?;
                fields.push(f.to_string());
            }
            if fields.is_empty() {
                return Err(invalid("fields list is empty"));
            }
            Some(fields)
        }
        None => None,
    };

    let (limit, offset) = parse_limit_offset(params)?;

    Ok(TableQuery {
        filters: parse_filters(params, table)?,
        fields,
        sort: parse_sort(params, table)?,
        limit,
        offset,
    })
}

fn valid_alias(alias: &str) -> bool {
    !alias.is_empty()
        && alias
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !alias.starts_with(|c: char| c.is_ascii_digit())
}

/// Parse and validate an aggregate query:
/// `group_by=a,b&aggregations=field:function[:alias][:round]`.
pub fn parse_aggregate_query(
    params: &HashMap<String, String>,
    table: &TableDef,
) -> Result<AggregateQuery, ApiError> {
    let group_raw = params
        .get("group_by")
        .ok_or(ApiError::MissingParameter("group_by"))?;
    let mut group_by = Vec::new();
    for g in group_raw.split(',').filter(|g| !g.is_empty()) {
        check_column(table, g)?;
        group_by.push(g.to_string());
    }
    if group_by.is_empty() {
        return Err(invalid("group_by list is empty"));
    }

    let aggs_raw = params
        .get("aggregations")
        .ok_or(ApiError::MissingParameter("aggregations"))?;
    let mut aggs = Vec::new();
    for spec in aggs_raw.split(',').filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(invalid(format!(
                "aggregation '{}' is not field:function[:alias][:round]",
                spec
            )));
        }
        let field = parts[0];
        let def = check_column(table, field)?;
        let func = AggFunc::parse(parts[1])
            .ok_or_else(|| invalid(format!("unknown aggregation function '{}'", parts[1])))?;
        if func.requires_numeric() && !def.kind.is_numeric() {
            return Err(invalid(format!(
                "{} needs a numeric column, '{}' is not",
                func.name(),
                field
            )));
        }

        let alias = match parts.get(2) {
            Some(a) if !a.is_empty() => {
                if !valid_alias(a) {
                    return Err(invalid(format!("alias '{}' is not a valid identifier", a)));
                }
                a.to_string()
            }
            _ => format!("{}_{}", field, func.name()),
        };
        let round = match parts.get(3) {
            Some(r) => Some(
                r.parse::<i32>()
                    .map_err(|_| invalid(format!("round '{}' is not an integer", r)))?,
            ),
            None => None,
        };

        aggs.push(AggSpec {
            field: field.to_string(),
            func,
            alias,
            round,
        });
    }
    if aggs.is_empty() {
        return Err(invalid("aggregations list is empty"));
    }

    let (limit, offset) = parse_limit_offset(params)?;

    Ok(AggregateQuery {
        filters: parse_filters(params, table)?,
        group_by,
        aggs,
        limit,
        offset,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn table() -> TableDef {
        let raw = [
            ("prices", "id", "bigint"),
            ("prices", "area_code_id", "bigint"),
            ("prices", "year", "integer"),
            ("prices", "unit", "text"),
            ("prices", "value", "double precision"),
        ];
        let rows = raw
            .iter()
            .map(|(t, c, d)| (t.to_string(), c.to_string(), d.to_string()))
            .collect();
        Registry::build(rows).table("prices").unwrap().clone()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // -------------------------------------------------------------------------
    // FILTERS
    // -------------------------------------------------------------------------

    #[test]
    fn test_filter_operators() {
        let q = parse_table_query(
            &params(&[
                ("year", "2015"),
                ("unit__like", "usd"),
                ("value__gte", "10"),
                ("area_code_id__in", "1,2,3"),
            ]),
            &table(),
        )
        .unwrap();
        assert_eq!(q.filters.len(), 4);
        let ops: Vec<&FilterOp> = q.filters.iter().map(|f| &f.op).collect();
        assert!(ops.contains(&&FilterOp::Eq));
        assert!(ops.contains(&&FilterOp::Like));
        assert!(ops.contains(&&FilterOp::Gte));
        assert!(ops.contains(&&FilterOp::In));
    }

    #[test]
    fn test_filter_unknown_column_rejected() {
        let err = parse_table_query(&params(&[("nope", "1")]), &table()).unwrap_err();
        assert_eq!(err.kind(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_like_on_numeric_rejected() {
        let err = parse_table_query(&params(&[("value__like", "1")]), &table()).unwrap_err();
        assert_eq!(err.kind(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_range_on_text_rejected() {
        let err = parse_table_query(&params(&[("unit__gte", "a")]), &table()).unwrap_err();
        assert_eq!(err.kind(), "INVALID_PARAMETER");
    }

    // -------------------------------------------------------------------------
    // FIELDS / SORT / PAGINATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_fields_projection() {
        let q = parse_table_query(&params(&[("fields", "year,value")]), &table()).unwrap();
        assert_eq!(q.fields.unwrap(), vec!["year", "value"]);
    }

    #[test]
    fn test_fields_unknown_rejected() {
        assert!(parse_table_query(&params(&[("fields", "year,nope")]), &table()).is_err());
    }

    #[test]
    fn test_sort_spec() {
        let q = parse_table_query(&params(&[("sort", "year:desc,value")]), &table()).unwrap();
        assert_eq!(q.sort[0], ("year".to_string(), SortDir::Desc));
        assert_eq!(q.sort[1], ("value".to_string(), SortDir::Asc));
    }

    #[test]
    fn test_sort_bad_direction_rejected() {
        assert!(parse_table_query(&params(&[("sort", "year:up")]), &table()).is_err());
    }

    #[test]
    fn test_limit_defaults_and_bounds() {
        let q = parse_table_query(&params(&[]), &table()).unwrap();
        assert_eq!(q.limit, DEFAULT_LIMIT);
        assert_eq!(q.offset, 0);

        assert!(parse_table_query(&params(&[("limit", "0")]), &table()).is_err());
        assert!(parse_table_query(&params(&[("limit", "999999")]), &table()).is_err());
        assert!(parse_table_query(&params(&[("offset", "-1")]), &table()).is_err());
    }

    // -------------------------------------------------------------------------
    // AGGREGATIONS
    // -------------------------------------------------------------------------

    #[test]
    fn test_aggregate_basic() {
        let q = parse_aggregate_query(
            &params(&[("group_by", "year"), ("aggregations", "value:sum")]),
            &table(),
        )
        .unwrap();
        assert_eq!(q.group_by, vec!["year"]);
        assert_eq!(q.aggs.len(), 1);
        assert_eq!(q.aggs[0].func, AggFunc::Sum);
        assert_eq!(q.aggs[0].alias, "value_sum");
        assert_eq!(q.aggs[0].round, None);
    }

    #[test]
    fn test_aggregate_alias_and_round() {
        let q = parse_aggregate_query(
            &params(&[("group_by", "year"), ("aggregations", "value:avg:mean_price:2")]),
            &table(),
        )
        .unwrap();
        assert_eq!(q.aggs[0].alias, "mean_price");
        assert_eq!(q.aggs[0].round, Some(2));
    }

    #[test]
    fn test_aggregate_missing_group_by() {
        let err = parse_aggregate_query(&params(&[("aggregations", "value:sum")]), &table())
            .unwrap_err();
        assert_eq!(err.kind(), "MISSING_PARAMETER");
    }

    #[test]
    fn test_aggregate_missing_aggregations() {
        let err =
            parse_aggregate_query(&params(&[("group_by", "year")]), &table()).unwrap_err();
        assert_eq!(err.kind(), "MISSING_PARAMETER");
    }

    #[test]
    fn test_aggregate_unknown_function() {
        assert!(parse_aggregate_query(
            &params(&[("group_by", "year"), ("aggregations", "value:mode")]),
            &table()
        )
        .is_err());
    }

    #[test]
    fn test_aggregate_numeric_function_on_text_rejected() {
        assert!(parse_aggregate_query(
            &params(&[("group_by", "year"), ("aggregations", "unit:sum")]),
            &table()
        )
        .is_err());
    }

    #[test]
    fn test_aggregate_count_on_text_allowed() {
        let q = parse_aggregate_query(
            &params(&[("group_by", "year"), ("aggregations", "unit:count_distinct")]),
            &table(),
        )
        .unwrap();
        assert_eq!(q.aggs[0].func, AggFunc::CountDistinct);
    }

    #[test]
    fn test_aggregate_bad_alias_rejected() {
        assert!(parse_aggregate_query(
            &params(&[("group_by", "year"), ("aggregations", "value:sum:1; DROP TABLE")]),
            &table()
        )
        .is_err());
    }
}
