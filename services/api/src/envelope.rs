//! Success envelope
//!
//! Every collection response carries the same shape: `{data, pagination,
//! links, _meta}`, mirrored into X-Total-* headers plus an RFC 5988 Link
//! header so clients can page without parsing the body.

use axum::http::{HeaderMap, HeaderValue};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize, PartialEq)]
pub struct Pagination {
    pub total: i64,
    pub total_pages: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
    pub first: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub last: String,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub table: String,
    pub elapsed_ms: u64,
}

#[derive(Serialize)]
pub struct Envelope {
    pub data: serde_json::Value,
    pub pagination: Pagination,
    pub links: Links,
    #[serde(rename = "_meta")]
    pub meta: Meta,
}

pub fn pagination(total: i64, limit: i64, offset: i64) -> Pagination {
    Pagination {
        total,
        total_pages: if total == 0 { 0 } else { (total + limit - 1) / limit },
        page: offset / limit + 1,
        per_page: limit,
    }
}

/// Conservative percent-encoding for query-string values.
fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b',' | b':' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn url_at_offset(path: &str, params: &HashMap<String, String>, limit: i64, offset: i64) -> String {
    let mut parts: Vec<String> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "offset" && k.as_str() != "limit")
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect();
    parts.sort();
    parts.push(format!("limit={}", limit));
    parts.push(format!("offset={}", offset));
    format!("{}?{}", path, parts.join("&"))
}

pub fn links(
    path: &str,
    params: &HashMap<String, String>,
    total: i64,
    limit: i64,
    offset: i64,
) -> Links {
    let last_offset = if total <= limit {
        0
    } else {
        ((total - 1) / limit) * limit
    };
    let prev = (offset > 0).then(|| url_at_offset(path, params, limit, (offset - limit).max(0)));
    let next = (offset + limit < total).then(|| url_at_offset(path, params, limit, offset + limit));
    Links {
        self_link: url_at_offset(path, params, limit, offset),
        first: url_at_offset(path, params, limit, 0),
        prev,
        next,
        last: url_at_offset(path, params, limit, last_offset),
    }
}

/// Pagination headers: X-Total-* plus the Link header.
pub fn headers(pagination: &Pagination, links: &Links) -> HeaderMap {
    let mut map = HeaderMap::new();
    let set = |map: &mut HeaderMap, name: &'static str, value: String| {
        if let Ok(v) = HeaderValue::from_str(&value) {
            map.insert(name, v);
        }
    };
    set(&mut map, "x-total-count", pagination.total.to_string());
    set(&mut map, "x-total-pages", pagination.total_pages.to_string());
    set(&mut map, "x-current-page", pagination.page.to_string());
    set(&mut map, "x-per-page", pagination.per_page.to_string());

    let mut rels = vec![
        format!("<{}>; rel=\"first\"", links.first),
        format!("<{}>; rel=\"last\"", links.last),
    ];
    if let Some(prev) = &links.prev {
        rels.push(format!("<{}>; rel=\"prev\"", prev));
    }
    if let Some(next) = &links.next {
        rels.push(format!("<{}>; rel=\"next\"", next));
    }
    set(&mut map, "link", rels.join(", "));
    map
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_math() {
        let p = pagination(250, 100, 0);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.page, 1);

        let p = pagination(250, 100, 200);
        assert_eq!(p.page, 3);

        let p = pagination(0, 100, 0);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.page, 1);

        let p = pagination(100, 100, 0);
        assert_eq!(p.total_pages, 1);
    }

    #[test]
    fn test_links_first_page() {
        let params = HashMap::from([("year".to_string(), "2015".to_string())]);
        let l = links("/tables/prices", &params, 250, 100, 0);
        assert_eq!(l.self_link, "/tables/prices?year=2015&limit=100&offset=0");
        assert_eq!(l.prev, None);
        assert_eq!(
            l.next.as_deref(),
            Some("/tables/prices?year=2015&limit=100&offset=100")
        );
        assert_eq!(l.last, "/tables/prices?year=2015&limit=100&offset=200");
    }

    #[test]
    fn test_links_last_page() {
        let params = HashMap::new();
        let l = links("/tables/prices", &params, 250, 100, 200);
        assert_eq!(
            l.prev.as_deref(),
            Some("/tables/prices?limit=100&offset=100")
        );
        assert_eq!(l.next, None);
    }

    #[test]
    fn test_links_replace_stale_offset() {
        // The incoming offset/limit params never leak into rebuilt urls.
        let params = HashMap::from([
            ("offset".to_string(), "100".to_string()),
            ("limit".to_string(), "50".to_string()),
        ]);
        let l = links("/tables/prices", &params, 10, 50, 0);
        assert_eq!(l.self_link, "/tables/prices?limit=50&offset=0");
    }

    #[test]
    fn test_encode_spaces_and_ampersands() {
        let params = HashMap::from([("unit__like".to_string(), "US $ & more".to_string())]);
        let l = links("/tables/prices", &params, 1, 100, 0);
        assert!(l.self_link.contains("unit__like=US%20%24%20%26%20more"));
    }

    #[test]
    fn test_headers_contain_link_relations() {
        let p = pagination(250, 100, 100);
        let l = links("/tables/prices", &HashMap::new(), 250, 100, 100);
        let h = headers(&p, &l);
        assert_eq!(h.get("x-total-count").unwrap(), "250");
        assert_eq!(h.get("x-current-page").unwrap(), "2");
        let link = h.get("link").unwrap().to_str().unwrap();
        assert!(link.contains("rel=\"first\""));
        assert!(link.contains("rel=\"prev\""));
        assert!(link.contains("rel=\"next\""));
        assert!(link.contains("rel=\"last\""));
    }
}
