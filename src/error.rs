/// Unified error types for the YachtLife backend
use crate::logbook::LogbookEntryType;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the backend
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Apple identity token verification errors
    #[error(transparent)]
    AppleAuth(#[from] AppleAuthError),

    /// Logbook classification and persistence errors
    #[error(transparent)]
    Logbook(#[from] LogbookError),

    /// Session token errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Apple identity token verification failures.
///
/// Every variant is terminal for a single `verify` call. Only
/// `KeyFetchFailed` is worth retrying; `InvalidSignature` never is.
#[derive(Error, Debug)]
pub enum AppleAuthError {
    #[error("Malformed identity token: {0}")]
    MalformedToken(String),

    #[error("Failed to fetch Apple public keys: {0}")]
    KeyFetchFailed(String),

    #[error("No Apple public key found for kid {0}")]
    KeyNotFound(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid identity token signature")]
    InvalidSignature,

    #[error("Claim validation failed: {0}")]
    ClaimValidationFailed(ClaimCheck),
}

impl AppleAuthError {
    /// Whether the caller may repeat the whole verification
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppleAuthError::KeyFetchFailed(_))
    }
}

/// The claim check that rejected an otherwise well-signed token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimCheck {
    Issuer,
    Audience,
    Expired,
    NotYetValid,
}

impl fmt::Display for ClaimCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClaimCheck::Issuer => "issuer mismatch",
            ClaimCheck::Audience => "audience mismatch",
            ClaimCheck::Expired => "token expired",
            ClaimCheck::NotYetValid => "token not yet valid",
        };
        f.write_str(s)
    }
}

/// Logbook errors
#[derive(Error, Debug)]
pub enum LogbookError {
    /// Booking or logbook lookup failed in the store
    #[error("Logbook lookup failed: {0}")]
    LookupFailed(#[source] sqlx::Error),

    /// A departure or return entry already exists for the booking
    #[error("Booking {booking_id} already has a {entry_type} entry")]
    Conflict {
        booking_id: Uuid,
        entry_type: LogbookEntryType,
    },

    #[error("Invalid entry type: {0}")]
    InvalidEntryType(String),
}

/// JSON error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::AppleAuth(AppleAuthError::KeyFetchFailed(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "IdentityProviderUnavailable",
                "Apple public keys are temporarily unavailable".to_string(),
            ),
            AppError::AppleAuth(_) => (
                StatusCode::UNAUTHORIZED,
                "InvalidIdentityToken",
                "Invalid Apple ID token".to_string(),
            ),
            AppError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            AppError::Logbook(LogbookError::Conflict { .. }) => (
                StatusCode::CONFLICT,
                "Conflict",
                self.to_string(),
            ),
            AppError::Logbook(LogbookError::InvalidEntryType(_)) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            AppError::Logbook(LogbookError::LookupFailed(_))
            | AppError::Database(_)
            | AppError::Config(_)
            | AppError::Internal(_)
            | AppError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for backend operations
pub type AppResult<T> = Result<T, AppError>;
