use std::time::Duration;

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors of the MediaServer login exchange.
///
/// Cloneable because one login outcome is handed to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("MediaServer is not configured: {0}")]
    NotConfigured(String),

    #[error("MediaServer login failed: {reason}")]
    LoginFailed { status: Option<u16>, reason: String },

    #[error("MediaServer unreachable: {0}")]
    Network(String),

    #[error("MediaServer login timed out after {0:?}")]
    Timeout(Duration),
}

impl From<BridgeError> for AuthError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Timeout(after) => AuthError::Timeout(after),
            other => AuthError::Network(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
