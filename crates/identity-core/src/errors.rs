// ABOUTME: Unified error handling for the identity core with stable error codes
// ABOUTME: Maps the security error taxonomy onto HTTP statuses and wire names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Unified Error Handling
//!
//! Every component returns [`AppResult`]. Validation and ownership checks fail
//! before any mutation; store failures surface as [`ErrorCode::InternalError`]
//! whose detail is logged but never rendered to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the identity core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication & Authorization
    /// Missing or invalid credential
    #[serde(rename = "AUTH_INVALID")]
    AuthInvalid,
    /// Caller lacks the role or ownership required
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied,
    /// Client exists but has been deactivated
    #[serde(rename = "CLIENT_INACTIVE")]
    ClientInactive,

    // Tokens
    /// Token `exp` is in the past
    #[serde(rename = "TOKEN_EXPIRED")]
    TokenExpired,
    /// Stateful token has been revoked
    #[serde(rename = "TOKEN_REVOKED")]
    TokenRevoked,
    /// Malformed token or bad signature
    #[serde(rename = "TOKEN_SIGNATURE_INVALID")]
    TokenSignatureInvalid,
    /// Token `kid` is not in the published key set
    #[serde(rename = "UNKNOWN_SIGNING_KEY")]
    UnknownSigningKey,

    // Rate Limiting
    /// Too many requests for this identifier in the current window
    #[serde(rename = "RATE_LIMIT_EXCEEDED")]
    RateLimitExceeded,

    // Validation
    /// Malformed input or out-of-range parameter
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,

    // Resources
    /// Resource does not exist
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound,
    /// Duplicate resource or lost compare-and-swap race
    #[serde(rename = "RESOURCE_CONFLICT")]
    ResourceConflict,

    // Detection
    /// Anomaly scan exceeded its deadline
    #[serde(rename = "DETECTION_TIMEOUT")]
    DetectionTimeout,

    // Configuration & Internal
    /// Configuration is missing or invalid
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError,
    /// Unexpected failure, including store failures
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput => 400,
            Self::AuthInvalid
            | Self::ClientInactive
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::TokenSignatureInvalid
            | Self::UnknownSigningKey => 401,
            Self::PermissionDenied => 403,
            Self::ResourceNotFound => 404,
            Self::ResourceConflict => 409,
            Self::RateLimitExceeded => 429,
            Self::DetectionTimeout => 503,
            Self::ConfigError | Self::InternalError => 500,
        }
    }

    /// Get a user-facing description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthInvalid => "The provided credentials are missing or invalid",
            Self::PermissionDenied => "You do not have permission to perform this action",
            Self::ClientInactive => "The client has been deactivated",
            Self::TokenExpired => "The token has expired",
            Self::TokenRevoked => "The token has been revoked",
            Self::TokenSignatureInvalid => "The token is malformed or its signature is invalid",
            Self::UnknownSigningKey => "The token was signed by an unknown key",
            Self::RateLimitExceeded => "Rate limit exceeded. Please slow down your requests",
            Self::InvalidInput => "The provided input is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ResourceConflict => "The resource was modified concurrently or already exists",
            Self::DetectionTimeout => "Anomaly detection did not complete within its deadline",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal server error occurred",
        }
    }

    /// Whether the message of this error may be shown to callers
    #[must_use]
    pub const fn is_internal(self) -> bool {
        matches!(self, Self::InternalError | Self::ConfigError)
    }
}

/// Unified error type for the identity core
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Structured details rendered alongside the message
    pub details: serde_json::Value,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
            source: None,
        }
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Missing or invalid credential
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Caller lacks role or ownership
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    /// Client authentication against a deactivated client
    pub fn client_inactive(client_id: &str) -> Self {
        Self::new(
            ErrorCode::ClientInactive,
            format!("Client {client_id} is inactive"),
        )
    }

    /// Token past its expiry
    pub fn token_expired(expired_at: DateTime<Utc>) -> Self {
        Self::new(
            ErrorCode::TokenExpired,
            format!("Token expired at {}", expired_at.to_rfc3339()),
        )
    }

    /// Revoked stateful token
    pub fn token_revoked() -> Self {
        Self::new(ErrorCode::TokenRevoked, "Token has been revoked")
    }

    /// Malformed token or bad signature
    pub fn signature_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TokenSignatureInvalid, message)
    }

    /// Token `kid` not in the published key set
    pub fn unknown_signing_key(kid: &str) -> Self {
        Self::new(
            ErrorCode::UnknownSigningKey,
            format!("Signing key {kid} is not published"),
        )
    }

    /// Rate limit exceeded, carrying the exhausted counter
    pub fn rate_limit_exceeded(limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self::new(
            ErrorCode::RateLimitExceeded,
            format!("Rate limit of {limit} requests exceeded"),
        )
        .with_details(serde_json::json!({
            "limit": limit,
            "remaining": 0,
            "reset_at": reset_at.to_rfc3339(),
        }))
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Duplicate resource or concurrent modification
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceConflict, message)
    }

    /// Anomaly detection deadline exceeded
    pub fn detection_timeout(deadline_ms: u128) -> Self {
        Self::new(
            ErrorCode::DetectionTimeout,
            format!("Anomaly detection exceeded its {deadline_ms}ms deadline"),
        )
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error body
    pub error: ErrorResponseDetails,
}

/// Body of an [`ErrorResponse`]
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Stable error code
    pub code: ErrorCode,
    /// Caller-safe message
    pub message: String,
    /// Structured details (omitted when null)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        // Internal detail stays in the logs
        let (message, details) = if error.code.is_internal() {
            (
                error.code.description().to_owned(),
                serde_json::Value::Null,
            )
        } else {
            (error.message.clone(), error.details.clone())
        };
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message,
                details,
            },
        }
    }
}

#[cfg(feature = "http-response")]
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = http::StatusCode::from_u16(self.http_status())
            .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
        if self.code.is_internal() {
            tracing::error!(code = ?self.code, error = %self.message, "Request failed with internal error");
        }
        (status, axum::Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::AuthInvalid.http_status(), 401);
        assert_eq!(ErrorCode::PermissionDenied.http_status(), 403);
        assert_eq!(ErrorCode::RateLimitExceeded.http_status(), 429);
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), 404);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn test_internal_detail_is_not_rendered() {
        let error = AppError::internal("store connection reset by peer 10.0.0.7");
        let response = ErrorResponse::from(&error);
        assert!(!response.error.message.contains("10.0.0.7"));
        assert_eq!(response.error.code, ErrorCode::InternalError);
    }

    #[test]
    fn test_rate_limit_error_carries_zero_remaining() {
        let error = AppError::rate_limit_exceeded(5, Utc::now());
        let json = serde_json::to_string(&ErrorResponse::from(&error)).unwrap();
        assert!(json.contains("RATE_LIMIT_EXCEEDED"));
        assert!(json.contains("\"remaining\":0"));
    }
}
