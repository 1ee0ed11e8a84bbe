use std::time::Duration;

use thiserror::Error;

/// Failures reported by host bridges.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host cannot provide the capability at all
    #[error("Bridge capability unavailable: {0}")]
    Unavailable(String),

    /// The remote end could not be reached
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// A body could not be encoded or decoded
    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
