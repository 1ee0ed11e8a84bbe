use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A setting is missing or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// An environment variable is set but cannot be parsed
    #[error("Invalid value for {var}: {message}")]
    InvalidEnv { var: String, message: String },

    /// No implementation available for a required bridge
    #[error("No {capability} available: {message}")]
    MissingBridge { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
