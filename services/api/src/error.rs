//! API error envelope
//!
//! Every failure surfaces as a JSON body with a stable `error_kind`
//! discriminator plus a human message. Query-surface errors never mutate
//! state; handlers bubble ApiError with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("unknown area code '{0}'")]
    InvalidAreaCode(String),

    #[error("unknown item code '{0}'")]
    InvalidItemCode(String),

    #[error("unknown element code '{0}'")]
    InvalidElementCode(String),

    #[error("no data found for the given parameters")]
    NoDataFound,

    #[error("unknown table '{0}'")]
    TableNotFound(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingParameter(_) => "MISSING_PARAMETER",
            ApiError::InvalidParameter(_) => "INVALID_PARAMETER",
            ApiError::InvalidAreaCode(_) => "INVALID_AREA_CODE",
            ApiError::InvalidItemCode(_) => "INVALID_ITEM_CODE",
            ApiError::InvalidElementCode(_) => "INVALID_ELEMENT_CODE",
            ApiError::NoDataFound => "NO_DATA_FOUND",
            ApiError::TableNotFound(_) => "TABLE_NOT_FOUND",
            ApiError::Db(_) => "DB_FAILURE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter(_)
            | ApiError::InvalidParameter(_)
            | ApiError::InvalidAreaCode(_)
            | ApiError::InvalidItemCode(_)
            | ApiError::InvalidElementCode(_) => StatusCode::BAD_REQUEST,
            ApiError::NoDataFound | ApiError::TableNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error_kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error_kind: self.kind(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(ApiError::MissingParameter("item_code").kind(), "MISSING_PARAMETER");
        assert_eq!(ApiError::InvalidParameter("x".into()).kind(), "INVALID_PARAMETER");
        assert_eq!(ApiError::InvalidAreaCode("999".into()).kind(), "INVALID_AREA_CODE");
        assert_eq!(ApiError::InvalidItemCode("999".into()).kind(), "INVALID_ITEM_CODE");
        assert_eq!(ApiError::InvalidElementCode("999".into()).kind(), "INVALID_ELEMENT_CODE");
        assert_eq!(ApiError::NoDataFound.kind(), "NO_DATA_FOUND");
        assert_eq!(ApiError::TableNotFound("x".into()).kind(), "TABLE_NOT_FOUND");
    }

    #[test]
    fn test_validation_errors_are_4xx() {
        assert_eq!(
            ApiError::MissingParameter("area_codes").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NoDataFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::TableNotFound("nope".into()).status(),
            StatusCode::NOT_FOUND
        );
    }
}
