use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use core_metadata::MetadataError;
use provider_mediaserver::MediaServerError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const MEDIASERVER_NOT_CONFIGURED: &str = "MEDIASERVER_NOT_CONFIGURED";
pub const MEDIASERVER_ERROR: &str = "MEDIASERVER_ERROR";
pub const MEDIASERVER_AUTH_EXPIRED: &str = "MEDIASERVER_AUTH_EXPIRED";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Failure classes a client can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required external service is not configured
    NotConfigured,
    /// Transport, timeout or non-2xx from an external service
    UpstreamUnavailable,
    /// MediaServer rejected a freshly issued token
    AuthExpired,
    /// Missing or malformed request parameters
    Validation,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    MediaServer(#[from] MediaServerError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::InitializationFailed(_) | CoreError::Config(_) => ErrorKind::NotConfigured,
            CoreError::Library(_) => ErrorKind::UpstreamUnavailable,
            CoreError::Metadata(error) => metadata_kind(error),
            CoreError::MediaServer(error) => mediaserver_kind(error),
        }
    }

    /// Stable code carried in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => VALIDATION_ERROR,
            CoreError::InitializationFailed(_) | CoreError::Config(_) | CoreError::Library(_) => {
                INTERNAL_ERROR
            }
            CoreError::Metadata(error) => metadata_code(error),
            CoreError::MediaServer(error) => mediaserver_code(error),
        }
    }

    /// 503 is reserved for TrackGraph configuration; MediaServer failures are
    /// always 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Metadata(MetadataError::Validation(_)) => StatusCode::BAD_REQUEST,
            CoreError::Metadata(MetadataError::NotConfigured { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn metadata_kind(error: &MetadataError) -> ErrorKind {
    match error {
        MetadataError::NotConfigured { .. } => ErrorKind::NotConfigured,
        MetadataError::Validation(_) => ErrorKind::Validation,
        MetadataError::MediaServer(inner) => mediaserver_kind(inner),
        _ => ErrorKind::UpstreamUnavailable,
    }
}

fn metadata_code(error: &MetadataError) -> &'static str {
    match error {
        MetadataError::NotConfigured { code, .. } | MetadataError::Upstream { code, .. } => *code,
        MetadataError::RateLimited { .. } => core_metadata::error::LASTFM_ERROR,
        MetadataError::Validation(_) => VALIDATION_ERROR,
        MetadataError::MediaServer(inner) => mediaserver_code(inner),
        _ => INTERNAL_ERROR,
    }
}

fn mediaserver_kind(error: &MediaServerError) -> ErrorKind {
    match error {
        MediaServerError::NotConfigured(_) => ErrorKind::NotConfigured,
        MediaServerError::AuthExpired => ErrorKind::AuthExpired,
        _ => ErrorKind::UpstreamUnavailable,
    }
}

fn mediaserver_code(error: &MediaServerError) -> &'static str {
    match error {
        MediaServerError::NotConfigured(_) => MEDIASERVER_NOT_CONFIGURED,
        MediaServerError::AuthExpired => MEDIASERVER_AUTH_EXPIRED,
        _ => MEDIASERVER_ERROR,
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        match self.kind() {
            ErrorKind::Validation | ErrorKind::NotConfigured => {
                warn!(code, error = %self, "Request rejected")
            }
            ErrorKind::UpstreamUnavailable | ErrorKind::AuthExpired => {
                error!(code, error = ?self, "Request failed")
            }
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
