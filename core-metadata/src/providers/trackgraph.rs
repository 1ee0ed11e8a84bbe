//! TrackGraph API Client
//!
//! Similar and top tracks from a Last.fm-compatible music graph API.
//!
//! ## API Endpoints
//!
//! - **Similar tracks**: `?method=track.getsimilar&artist={artist}&track={track}&limit={n}&autocorrect=1&format=json`
//! - **Top tracks**: `?method=artist.gettoptracks&artist={artist}&limit={n}&autocorrect=1&format=json`
//!
//! ## Rate Limiting
//!
//! A minimum delay is enforced between consecutive requests
//! (`MetadataApiConfig::rate_limit_delay_ms`).
//!
//! ## API Key Requirement
//!
//! Every call needs an API key. Without one, both operations fail with
//! `LASTFM_NOT_CONFIGURED` before any request is made.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use core_runtime::config::{MetadataApiConfig, DEFAULT_REQUEST_TIMEOUT};
use core_runtime::logging::redact_url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::enrichment::Candidate;
use crate::error::{MetadataError, Result};

/// Default number of similar tracks
pub const DEFAULT_SIMILAR_LIMIT: u32 = 20;

/// Default number of top tracks
pub const DEFAULT_TOP_LIMIT: u32 = 10;

/// Upper bound for any requested limit
pub const MAX_LIMIT: u32 = 100;

const USER_AGENT: &str = concat!("Mixdeck/", env!("CARGO_PKG_VERSION"));

/// Parses a client-supplied limit.
///
/// Absent, malformed, zero or negative values fall back to `default`; larger
/// values are clamped to [`MAX_LIMIT`].
pub fn parse_limit(raw: Option<&str>, default: u32) -> u32 {
    match raw.and_then(|value| value.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => n.min(MAX_LIMIT as i64) as u32,
        _ => default,
    }
}

/// A track similar to the queried one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarTrack {
    pub artist: String,
    pub title: String,
    /// Similarity in `0.0..=1.0`
    pub match_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One of an artist's most played tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopTrack {
    pub artist: String,
    pub title: String,
    pub play_count: u64,
    pub rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Candidate for SimilarTrack {
    fn artist(&self) -> &str {
        &self.artist
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl Candidate for TopTrack {
    fn artist(&self) -> &str {
        &self.artist
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// Simple rate limiter to enforce delay between requests
struct RateLimiter {
    last_request: Option<Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    fn new(delay_ms: u64) -> Self {
        Self {
            last_request: None,
            min_delay: Duration::from_millis(delay_ms),
        }
    }

    async fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

// Wire format. Numeric fields arrive as numbers or strings depending on the
// endpoint, so they are read as raw JSON values.

#[derive(Debug, Deserialize)]
struct SimilarTracksResponse {
    similartracks: TrackList,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    toptracks: TrackList,
}

#[derive(Debug, Deserialize)]
struct TrackList {
    #[serde(default, deserialize_with = "one_or_many")]
    track: Vec<WireTrack>,
}

#[derive(Debug, Deserialize)]
struct WireTrack {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artist: Option<WireArtist>,
    #[serde(default, rename = "match")]
    match_score: Option<Value>,
    #[serde(default)]
    playcount: Option<Value>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "@attr")]
    attr: Option<WireAttr>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireArtist {
    Object { name: String },
    Name(String),
}

impl WireArtist {
    fn name(&self) -> &str {
        match self {
            WireArtist::Object { name } | WireArtist::Name(name) => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireAttr {
    #[serde(default)]
    rank: Option<Value>,
}

/// Last.fm error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: i32,
    #[serde(default)]
    message: String,
}

/// A single result is sometimes returned as an object instead of an array.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<WireTrack>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<WireTrack>),
        One(Box<WireTrack>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(tracks)) => tracks,
        Some(OneOrMany::One(track)) => vec![*track],
        None => Vec::new(),
    })
}

fn value_to_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl WireTrack {
    /// Artist and title, or `None` when either is blank.
    fn identity(&self) -> Option<(String, String)> {
        let artist = self.artist.as_ref()?.name().trim();
        let title = self.name.trim();
        if artist.is_empty() || title.is_empty() {
            return None;
        }
        Some((artist.to_string(), title.to_string()))
    }
}

/// TrackGraph API client
///
/// Cheap to share behind an `Arc`; the rate limiter is shared by every
/// request made through one client.
pub struct TrackGraphClient {
    http_client: Arc<dyn HttpClient>,
    api_key: Option<String>,
    base_url: String,
    request_timeout: Duration,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl TrackGraphClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: &MetadataApiConfig) -> Self {
        Self {
            http_client,
            api_key: config
                .lastfm_api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            base_url: config.lastfm_base_url.clone(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(config.rate_limit_delay_ms))),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Tracks similar to `artist` - `track`, most similar first.
    #[instrument(skip(self))]
    pub async fn get_similar_tracks(
        &self,
        artist: &str,
        track: &str,
        limit: u32,
    ) -> Result<Vec<SimilarTrack>> {
        let limit = limit.clamp(1, MAX_LIMIT);
        let limit_param = limit.to_string();
        let response: SimilarTracksResponse = self
            .call(
                "track.getsimilar",
                &[
                    ("artist", artist.trim()),
                    ("track", track.trim()),
                    ("limit", limit_param.as_str()),
                ],
            )
            .await?;

        let tracks: Vec<SimilarTrack> = response
            .similartracks
            .track
            .into_iter()
            .filter_map(|wire| {
                let (artist, title) = wire.identity()?;
                Some(SimilarTrack {
                    artist,
                    title,
                    match_score: value_to_f64(wire.match_score.as_ref()).unwrap_or(0.0),
                    url: wire.url,
                })
            })
            .take(limit as usize)
            .collect();

        info!(count = tracks.len(), "Fetched similar tracks");
        Ok(tracks)
    }

    /// An artist's top tracks, highest ranked first.
    #[instrument(skip(self))]
    pub async fn get_top_tracks(&self, artist: &str, limit: u32) -> Result<Vec<TopTrack>> {
        let limit = limit.clamp(1, MAX_LIMIT);
        let limit_param = limit.to_string();
        let response: TopTracksResponse = self
            .call(
                "artist.gettoptracks",
                &[("artist", artist.trim()), ("limit", limit_param.as_str())],
            )
            .await?;

        let tracks: Vec<TopTrack> = response
            .toptracks
            .track
            .into_iter()
            .enumerate()
            .filter_map(|(index, wire)| {
                let (artist, title) = wire.identity()?;
                let rank = wire
                    .attr
                    .as_ref()
                    .and_then(|attr| value_to_u64(attr.rank.as_ref()))
                    .map(|rank| rank as u32)
                    .unwrap_or(index as u32 + 1);
                Some(TopTrack {
                    artist,
                    title,
                    play_count: value_to_u64(wire.playcount.as_ref()).unwrap_or(0),
                    rank,
                    url: wire.url,
                })
            })
            .take(limit as usize)
            .collect();

        info!(count = tracks.len(), "Fetched top tracks");
        Ok(tracks)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(MetadataError::trackgraph_not_configured)?;

        if let Some((name, _)) = params.iter().find(|(_, value)| value.is_empty()) {
            return Err(MetadataError::Validation(format!("{} is required", name)));
        }

        let mut url = format!(
            "{}?method={}&api_key={}&format=json&autocorrect=1",
            self.base_url,
            method,
            urlencoding::encode(api_key)
        );
        for (name, value) in params {
            url.push_str(&format!("&{}={}", name, urlencoding::encode(value)));
        }

        debug!(url = %redact_url(&url), "Querying TrackGraph");

        self.rate_limiter.lock().await.wait_if_needed().await;

        let request = HttpRequest::new(HttpMethod::Get, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .timeout(self.request_timeout);

        let response = self.http_client.execute(request).await.map_err(|e| {
            warn!(error = %e, "TrackGraph request failed");
            MetadataError::trackgraph(format!("Last.fm request failed: {}", e))
        })?;

        if response.status == 429 {
            let retry_after = response
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
                .and_then(|(_, value)| value.parse::<u64>().ok())
                .unwrap_or(60);

            warn!(retry_after, "TrackGraph rate limit hit");
            return Err(MetadataError::RateLimited {
                provider: "Last.fm".to_string(),
                retry_after_seconds: retry_after,
            });
        }

        if let Ok(error_resp) = serde_json::from_slice::<ErrorResponse>(&response.body) {
            warn!(code = error_resp.error, "TrackGraph API error");
            return Err(MetadataError::trackgraph(format!(
                "Last.fm API error {}: {}",
                error_resp.error, error_resp.message
            )));
        }

        if !response.is_success() {
            warn!(status = response.status, "TrackGraph returned an error status");
            return Err(MetadataError::trackgraph(format!(
                "Last.fm responded with status {}",
                response.status
            )));
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            MetadataError::trackgraph(format!("Failed to parse Last.fm response: {}", e))
        })
    }
}
