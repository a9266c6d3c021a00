//! Error types for Wicket
//!
//! One taxonomy for every caller-visible failure. Authentication failures
//! deliberately collapse distinct causes (unknown email, wrong password,
//! disabled account) into a single variant so responses cannot be used to
//! enumerate accounts.

use hyper::StatusCode;
use serde::Serialize;

use crate::auth::TokenError;
use crate::store::StoreError;

/// A single request-validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main error type for Wicket operations
#[derive(Debug, thiserror::Error)]
pub enum WicketError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Refresh token is invalid or expired")]
    InvalidRefreshToken,

    #[error("Token is invalid or expired")]
    InvalidAccessToken,

    #[error("Insufficient permissions for this operation")]
    PermissionDenied,

    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WicketError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::InvalidRefreshToken
            | Self::InvalidAccessToken
            | Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            Self::InvalidAccessToken => "INVALID_ACCESS_TOKEN",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Message safe to show a caller.
    ///
    /// Store, signing and configuration details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unavailable(_) => "Service temporarily unavailable, please retry".to_string(),
            Self::Internal(_) | Self::Config(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StoreError> for WicketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(op) => Self::Unavailable(format!("store timed out during {op}")),
            StoreError::Backend(msg) => Self::Unavailable(msg),
            StoreError::Conflict(msg) => Self::BadRequest(msg),
        }
    }
}

impl From<TokenError> for WicketError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => Self::Internal(format!("token signing failed: {msg}")),
            _ => Self::InvalidAccessToken,
        }
    }
}

impl From<std::io::Error> for WicketError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for WicketError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

/// Result type alias for Wicket operations
pub type Result<T> = std::result::Result<T, WicketError>;
