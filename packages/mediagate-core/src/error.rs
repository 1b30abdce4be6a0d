//! Centralized error types for the media gateway core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type for the media gateway.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum GatewayError {
    /// Caller presented no token, or the token is unknown to the store.
    #[error("Invalid or missing token")]
    InvalidToken,

    /// Token's daily or monthly byte budget has been exhausted.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The opaque id could not be decoded into a chat/message pair.
    #[error("Invalid id")]
    InvalidId,

    /// The `unique_id` prefix embedded in the request did not match the file.
    #[error("Invalid hash")]
    InvalidHash,

    /// Upstream reports no such message, or it carries no media.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The `Range` header was malformed or out of bounds.
    #[error("Range not satisfiable")]
    BadRange { file_size: u64 },

    /// Chunk retries were exhausted mid-stream.
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetchFailure(String),

    /// Establishing or importing an upstream session failed.
    #[error("Session failure: {0}")]
    SessionFailure(String),

    /// Requested stream id is neither active nor recently finished.
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// Catch-all for conditions that should not be reachable.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::InvalidId => "invalid_id",
            Self::InvalidHash => "invalid_hash",
            Self::FileNotFound(_) => "file_not_found",
            Self::BadRange { .. } => "bad_range",
            Self::UpstreamFetchFailure(_) => "upstream_fetch_failed",
            Self::SessionFailure(_) => "session_failure",
            Self::StreamNotFound(_) => "stream_not_found",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::QuotaExceeded(_) => StatusCode::FORBIDDEN,
            Self::InvalidId | Self::InvalidHash => StatusCode::BAD_REQUEST,
            Self::FileNotFound(_) | Self::StreamNotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::UpstreamFetchFailure(_) | Self::SessionFailure(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 416 must carry Content-Range: bytes */{size} per the range contract
        // even though the body is a generic JSON error.
        if let Self::BadRange { file_size } = &self {
            let body = ErrorResponse {
                error: self.code(),
                message: self.to_string(),
                status: status.as_u16(),
            };
            return (
                status,
                [("Content-Range", format!("bytes */{file_size}"))],
                Json(body),
            )
                .into_response();
        }

        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
