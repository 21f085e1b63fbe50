//! Centralized error type for the control-plane library.
//!
//! Composes the component-specific error enums (`ConfigError`, `StoreError`,
//! ...) into one type the HTTP layer can turn into a response via a shared
//! `ErrorCode` + `IntoResponse` split.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::LifecycleError;
use crate::store::StoreError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "config_io_error",
            Self::Parse { .. } => "config_parse_error",
            Self::UnknownChannel(_) => "unknown_channel",
            Self::MissingField { .. } => "config_missing_field",
            Self::InvalidValue { .. } => "config_invalid_value",
        }
    }
}

impl ErrorCode for StoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "run_state_read_failed",
            Self::Write { .. } => "run_state_write_failed",
            Self::Remove { .. } => "run_state_remove_failed",
            Self::Corrupt { .. } => "run_state_corrupt",
        }
    }
}

/// Application-wide error type for the control-plane HTTP API.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(
        #[serde(skip)]
        #[source]
        ConfigError,
    ),

    #[error("state store error: {0}")]
    Store(
        #[serde(skip)]
        #[source]
        StoreError,
    ),

    #[error("lifecycle error: {0}")]
    Lifecycle(
        #[serde(skip)]
        #[source]
        LifecycleError,
    ),

    #[error("channel '{0}' is already running")]
    AlreadyRunning(String),

    #[error("channel '{0}' is not running")]
    NotRunning(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.code(),
            Self::Store(e) => e.code(),
            Self::Lifecycle(e) => e.code(),
            Self::AlreadyRunning(_) => "already_running",
            Self::NotRunning(_) => "not_running",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(ConfigError::UnknownChannel(_)) => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Lifecycle(e) => e.status_code(),
            Self::AlreadyRunning(_) => StatusCode::CONFLICT,
            Self::NotRunning(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<LifecycleError> for CoreError {
    fn from(err: LifecycleError) -> Self {
        Self::Lifecycle(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_channel_maps_to_not_found() {
        let err = CoreError::Config(ConfigError::UnknownChannel("news".into()));
        assert_eq!(err.code(), "unknown_channel");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn already_running_maps_to_conflict() {
        let err = CoreError::AlreadyRunning("news".into());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
