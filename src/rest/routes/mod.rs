pub mod health;
pub mod routines;
pub mod tasks;

use axum::{http::StatusCode, Json};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};

use crate::engine::EngineError;

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn engine_error(e: EngineError) -> ApiError {
    let status = match &e {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

pub(crate) fn bad_request(msg: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
}

/// Parse a boundary date string. Accepts full RFC 3339, a bare date
/// (midnight UTC), or a naive date-time without offset (treated as UTC).
pub(crate) fn parse_boundary_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
        return Ok(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
    }
    Err(format!("'{s}' is not an ISO-8601 date"))
}

/// Parse a range-end date string. A bare date expands to the end of that
/// day, so `startDate=2024-01-01&endDate=2024-01-01` covers the whole day.
pub(crate) fn parse_end_boundary(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_hms_opt(23, 59, 59).unwrap_or_default().and_utc());
    }
    parse_boundary_date(s)
}
