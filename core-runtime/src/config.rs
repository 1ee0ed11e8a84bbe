//! # Core Configuration Module
//!
//! Configuration for the metadata aggregation core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding every setting and injected bridge the core needs. Validation is
//! fail-fast: a malformed URL or an impossible timeout is rejected at build
//! time, while a service that is simply absent (no MediaServer URL, no
//! TrackGraph key) is accepted and later reported as "not configured" by the
//! component that needs it.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, MediaServerConfig, MetadataApiConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/mixdeck/mixdeck.db")
//!     .media_server(
//!         MediaServerConfig::new("http://jellyfin.local:8096")
//!             .with_credentials("dj", "secret"),
//!     )
//!     .metadata_api_config(MetadataApiConfig::new().with_lastfm_api_key("key"))
//!     .build()?;
//! ```
//!
//! ## Environment
//!
//! [`CoreConfig::from_env`] reads:
//!
//! | Variable | Setting |
//! |---|---|
//! | `MIXDECK_DATABASE_PATH` | database file (default `mixdeck.db`) |
//! | `MEDIASERVER_URL` | MediaServer base URL |
//! | `MEDIASERVER_USERNAME` / `MEDIASERVER_PASSWORD` | MediaServer credentials |
//! | `LASTFM_API_KEY` | TrackGraph API key |
//! | `LYRICS_API_URL` | lyrics API base URL |
//! | `LYRICS_API_ENABLED` | `false`/`0` disables the lyrics API provider |
//! | `MIXDECK_REQUEST_TIMEOUT_SECS` | per-call outbound timeout |

use crate::error::{Error, Result};
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default per-call timeout for outbound requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Lyrics cache entries live for 30 days.
pub const DEFAULT_LYRICS_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub const DEFAULT_LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";
pub const DEFAULT_LYRICS_API_URL: &str = "https://lrclib.net";

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Timeout applied to every outbound call
    pub request_timeout: Duration,

    /// HTTP client for outbound requests (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// MediaServer connection settings
    pub media_server: MediaServerConfig,

    /// TrackGraph (Last.fm-compatible) settings
    pub metadata_api_config: MetadataApiConfig,

    /// Lyrics cache and lyrics API settings
    pub lyrics: LyricsCacheConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("request_timeout", &self.request_timeout)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("media_server", &self.media_server)
            .field("metadata_api_config", &self.metadata_api_config)
            .field("lyrics", &self.lyrics)
            .finish()
    }
}

/// MediaServer (Jellyfin-compatible) connection settings.
///
/// Every field is optional at the configuration level. A missing base URL or
/// missing credentials surface as "not configured" errors when the session or
/// proxy is used, never as a startup failure.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaServerConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Client name reported in the authorization header
    pub client_name: String,
    /// Device name reported in the authorization header
    pub device_name: String,
    /// Client version reported in the authorization header
    pub client_version: String,
    /// Lifetime assumed for issued tokens. `None` means tokens stay valid
    /// until the server rejects them.
    pub token_ttl: Option<Duration>,
    /// Upper bound on a single login exchange
    pub login_timeout: Duration,
}

impl Default for MediaServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            password: None,
            client_name: "Mixdeck".to_string(),
            device_name: "mixdeck-core".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            token_ttl: None,
            login_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for MediaServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaServerConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("client_name", &self.client_name)
            .field("device_name", &self.device_name)
            .field("client_version", &self.client_version)
            .field("token_ttl", &self.token_ttl)
            .field("login_timeout", &self.login_timeout)
            .finish()
    }
}

impl MediaServerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Base URL without trailing slashes, if set and non-empty.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.base_url().is_some()
    }

    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty()) && self.password.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = self.base_url() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "MediaServer URL must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }

        if self.login_timeout.is_zero() {
            return Err(Error::Config(
                "MediaServer login timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration for the TrackGraph (Last.fm-compatible) API.
///
/// # Security Note
///
/// API keys should never be hardcoded in the binary. Load them from the
/// environment or inject them from the host's secret store.
///
/// # Example
///
/// ```no_run
/// use core_runtime::config::MetadataApiConfig;
///
/// let config = MetadataApiConfig::new()
///     .with_lastfm_api_key("your_lastfm_api_key")
///     .with_rate_limit_delay_ms(200);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct MetadataApiConfig {
    /// Last.fm API key used for `track.getsimilar` and `artist.gettoptracks`
    ///
    /// This is optional - without it, TrackGraph requests report
    /// `LASTFM_NOT_CONFIGURED`.
    pub lastfm_api_key: Option<String>,

    /// Base URL of the Last.fm-compatible endpoint
    pub lastfm_base_url: String,

    /// Minimum delay in milliseconds between TrackGraph requests
    pub rate_limit_delay_ms: u64,
}

impl Default for MetadataApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetadataApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataApiConfig")
            .field(
                "lastfm_api_key",
                &self.lastfm_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("lastfm_base_url", &self.lastfm_base_url)
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .finish()
    }
}

impl MetadataApiConfig {
    /// Creates a new MetadataApiConfig with no API key configured
    pub fn new() -> Self {
        Self {
            lastfm_api_key: None,
            lastfm_base_url: DEFAULT_LASTFM_BASE_URL.to_string(),
            rate_limit_delay_ms: 200,
        }
    }

    /// Sets the Last.fm API key
    pub fn with_lastfm_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.lastfm_api_key = Some(api_key.into());
        self
    }

    /// Points the client at a different Last.fm-compatible endpoint
    pub fn with_lastfm_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.lastfm_base_url = base_url.into();
        self
    }

    /// Sets the rate limit delay in milliseconds
    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.lastfm_base_url.trim().is_empty() {
            return Err(Error::Config(
                "Last.fm base URL cannot be empty".to_string(),
            ));
        }

        if self.rate_limit_delay_ms > 60_000 {
            return Err(Error::Config(
                "Rate limit delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks if Last.fm is configured
    pub fn has_lastfm(&self) -> bool {
        self.lastfm_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Lyrics cache and lyrics API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsCacheConfig {
    /// Lifetime of a cache entry, positive or negative
    pub ttl: Duration,
    /// Base URL of the LRCLIB-compatible lyrics API
    pub lyrics_api_url: String,
    /// Whether the lyrics API provider is consulted at all
    pub lyrics_api_enabled: bool,
    /// Interval of the background purge of expired entries; `None` disables it
    pub sweep_interval: Option<Duration>,
}

impl Default for LyricsCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_LYRICS_TTL,
            lyrics_api_url: DEFAULT_LYRICS_API_URL.to_string(),
            lyrics_api_enabled: true,
            sweep_interval: Some(Duration::from_secs(6 * 60 * 60)),
        }
    }
}

impl LyricsCacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(Error::Config(
                "Lyrics cache TTL must be greater than 0".to_string(),
            ));
        }

        if self.lyrics_api_enabled && self.lyrics_api_url.trim().is_empty() {
            return Err(Error::Config(
                "Lyrics API is enabled but no URL is set".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Builds a configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut builder = CoreConfig::builder()
            .database_path(var("MIXDECK_DATABASE_PATH").unwrap_or_else(|| "mixdeck.db".into()));

        let mut media_server = MediaServerConfig {
            base_url: var("MEDIASERVER_URL"),
            ..MediaServerConfig::default()
        };
        media_server.username = var("MEDIASERVER_USERNAME");
        media_server.password = var("MEDIASERVER_PASSWORD");
        builder = builder.media_server(media_server);

        let mut metadata = MetadataApiConfig::new();
        metadata.lastfm_api_key = var("LASTFM_API_KEY");
        builder = builder.metadata_api_config(metadata);

        let mut lyrics = LyricsCacheConfig::default();
        if let Some(url) = var("LYRICS_API_URL") {
            lyrics.lyrics_api_url = url;
        }
        if let Some(flag) = var("LYRICS_API_ENABLED") {
            lyrics.lyrics_api_enabled = parse_flag("LYRICS_API_ENABLED", &flag)?;
        }
        builder = builder.lyrics(lyrics);

        if let Some(raw) = var("MIXDECK_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| Error::InvalidEnv {
                var: "MIXDECK_REQUEST_TIMEOUT_SECS".to_string(),
                message: format!("expected whole seconds, got '{}'", raw),
            })?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout > Duration::from_secs(300) {
            return Err(Error::Config(
                "Request timeout exceeds maximum of 300 seconds".to_string(),
            ));
        }

        self.media_server.validate()?;
        self.metadata_api_config.validate()?;
        self.lyrics.validate()?;

        Ok(())
    }
}

fn parse_flag(var: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidEnv {
            var: var.to_string(),
            message: format!("expected a boolean flag, got '{}'", other),
        }),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout).map_err(|e| {
        Error::MissingBridge {
            capability: "HttpClient".to_string(),
            message: e.to_string(),
        }
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::MissingBridge {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                  Enable the 'desktop-shims' feature to use the default reqwest client \
                  or inject one with .http_client()."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    request_timeout: Option<Duration>,
    http_client: Option<Arc<dyn HttpClient>>,
    media_server: Option<MediaServerConfig>,
    metadata_api_config: Option<MetadataApiConfig>,
    lyrics: Option<LyricsCacheConfig>,
}

impl CoreConfigBuilder {
    /// Sets the path to the SQLite database file.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the timeout applied to every outbound call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Injects the HTTP client used for every outbound call.
    ///
    /// When omitted, the desktop reqwest client is used if the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn media_server(mut self, config: MediaServerConfig) -> Self {
        self.media_server = Some(config);
        self
    }

    pub fn metadata_api_config(mut self, config: MetadataApiConfig) -> Self {
        self.metadata_api_config = Some(config);
        self
    }

    pub fn lyrics(mut self, config: LyricsCacheConfig) -> Self {
        self.lyrics = Some(config);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - The database path is missing
    /// - A value is out of range or malformed
    /// - No HTTP client was injected and no default is available
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let config = CoreConfig {
            database_path,
            request_timeout,
            http_client: Some(http_client),
            media_server: self.media_server.unwrap_or_default(),
            metadata_api_config: self.metadata_api_config.unwrap_or_default(),
            lyrics: self.lyrics.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use std::collections::HashMap;

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse {
                status: 204,
                headers: HashMap::new(),
                body: Default::default(),
            })
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/tmp/mixdeck.db")
            .http_client(Arc::new(NoopHttpClient))
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builder_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(!config.media_server.is_configured());
        assert!(!config.metadata_api_config.has_lastfm());
        assert_eq!(config.lyrics.ttl, DEFAULT_LYRICS_TTL);
        assert!(config.lyrics.lyrics_api_enabled);
    }

    #[test]
    fn test_missing_database_path() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(NoopHttpClient))
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Database path")));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = builder().request_timeout(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_media_server_url_must_be_http() {
        let result = builder()
            .media_server(MediaServerConfig::new("ftp://jellyfin.local"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_media_server_base_url_trimmed() {
        let config = MediaServerConfig::new("http://jellyfin.local:8096/  ");
        assert_eq!(config.base_url(), Some("http://jellyfin.local:8096"));
        assert!(!config.has_credentials());

        let blank = MediaServerConfig::new("   ");
        assert!(!blank.is_configured());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let media = MediaServerConfig::new("http://jf").with_credentials("dj", "hunter2");
        let metadata = MetadataApiConfig::new().with_lastfm_api_key("abc123");

        let rendered = format!("{:?} {:?}", media, metadata);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_blank_api_key_is_not_configured() {
        let config = MetadataApiConfig::new().with_lastfm_api_key("  ");
        assert!(!config.has_lastfm());
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_from_lookup_reads_variables() {
        let config = CoreConfig::from_lookup(lookup(&[
            ("MIXDECK_DATABASE_PATH", "/data/mixdeck.db"),
            ("MEDIASERVER_URL", "http://jf:8096"),
            ("MEDIASERVER_USERNAME", "dj"),
            ("MEDIASERVER_PASSWORD", "pw"),
            ("LASTFM_API_KEY", "key"),
            ("LYRICS_API_ENABLED", "false"),
            ("MIXDECK_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/data/mixdeck.db"));
        assert_eq!(config.media_server.base_url(), Some("http://jf:8096"));
        assert!(config.media_server.has_credentials());
        assert!(config.metadata_api_config.has_lastfm());
        assert!(!config.lyrics.lyrics_api_enabled);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_lookup_rejects_bad_timeout() {
        let result = CoreConfig::from_lookup(lookup(&[("MIXDECK_REQUEST_TIMEOUT_SECS", "soon")]));
        assert!(matches!(result, Err(Error::InvalidEnv { .. })));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("LYRICS_API_ENABLED", "TRUE").unwrap());
        assert!(!parse_flag("LYRICS_API_ENABLED", "0").unwrap());
        assert!(matches!(
            parse_flag("LYRICS_API_ENABLED", "maybe"),
            Err(Error::InvalidEnv { var, .. }) if var == "LYRICS_API_ENABLED"
        ));
    }
}
