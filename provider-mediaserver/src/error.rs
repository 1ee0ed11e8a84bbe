//! Error types for the MediaServer provider

use std::time::Duration;

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

/// MediaServer provider errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaServerError {
    /// Base URL or credentials missing
    #[error("MediaServer is not configured: {0}")]
    NotConfigured(String),

    /// Token rejected again right after a fresh login
    #[error("MediaServer authentication expired")]
    AuthExpired,

    /// Login exchange failed
    #[error(transparent)]
    Auth(AuthError),

    /// API request returned an unexpected status
    #[error("MediaServer API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Failed to parse API response
    #[error("Failed to parse MediaServer response: {0}")]
    ParseError(String),

    /// Network error
    #[error("MediaServer request failed: {0}")]
    NetworkError(String),

    #[error("MediaServer request timed out after {0:?}")]
    Timeout(Duration),
}

impl MediaServerError {
    /// Whether the failure is on the MediaServer side rather than ours.
    pub fn is_upstream(&self) -> bool {
        !matches!(self, MediaServerError::NotConfigured(_))
    }
}

impl From<AuthError> for MediaServerError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotConfigured(message) => MediaServerError::NotConfigured(message),
            other => MediaServerError::Auth(other),
        }
    }
}

impl From<BridgeError> for MediaServerError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Timeout(after) => MediaServerError::Timeout(after),
            other => MediaServerError::NetworkError(other.to_string()),
        }
    }
}

/// Result type for MediaServer operations
pub type Result<T> = std::result::Result<T, MediaServerError>;
