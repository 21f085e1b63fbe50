//! Response envelope helpers shared by all HTTP handlers.
//!
//! Mutating endpoints (`/start`, `/stop`, `/restart`) reply with the
//! `{status, message}` envelope spec.md §6 names; read endpoints return their
//! payload directly wrapped the same way for consistency.

use axum::response::{IntoResponse, Json, Response};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};

/// Bare `{status: "success"}` body for mutating endpoints with nothing else
/// to report.
pub fn api_ok() -> Response {
    (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
}

/// `{status: "success", ...payload}` for endpoints returning data alongside
/// the envelope.
pub fn api_success<T: Serialize>(payload: T) -> Response {
    let mut body = json!({ "status": "success" });
    merge_object(&mut body, serde_json::to_value(payload).unwrap_or(Value::Null));
    (StatusCode::OK, Json(body)).into_response()
}

/// `{status: "error", error: <code>, message: <display>}` with the given
/// HTTP status.
pub fn api_error(status: StatusCode, code: &str, err: impl std::fmt::Display) -> Response {
    let body = json!({
        "status": "error",
        "error": code,
        "message": err.to_string(),
    });
    (status, Json(body)).into_response()
}

fn merge_object(base: &mut Value, extra: Value) {
    if let (Value::Object(base_map), Value::Object(extra_map)) = (base, extra) {
        base_map.extend(extra_map);
    }
}
