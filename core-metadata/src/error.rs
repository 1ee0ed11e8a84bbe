use core_library::LibraryError;
use provider_mediaserver::MediaServerError;
use thiserror::Error;

/// Client code for a missing TrackGraph API key
pub const LASTFM_NOT_CONFIGURED: &str = "LASTFM_NOT_CONFIGURED";

/// Client code for any TrackGraph failure
pub const LASTFM_ERROR: &str = "LASTFM_ERROR";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("{message}")]
    NotConfigured { code: &'static str, message: String },

    #[error("{message}")]
    Upstream { code: &'static str, message: String },

    #[error("Rate limited by {provider}, retry after {retry_after_seconds} seconds")]
    RateLimited {
        provider: String,
        retry_after_seconds: u64,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Lyrics fetch failed: {0}")]
    LyricsFetchFailed(String),

    #[error("Failed to parse response: {0}")]
    JsonParse(String),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error(transparent)]
    MediaServer(#[from] MediaServerError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

impl MetadataError {
    pub fn trackgraph_not_configured() -> Self {
        MetadataError::NotConfigured {
            code: LASTFM_NOT_CONFIGURED,
            message: "Last.fm API key is not configured".to_string(),
        }
    }

    pub fn trackgraph(message: impl Into<String>) -> Self {
        MetadataError::Upstream {
            code: LASTFM_ERROR,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
