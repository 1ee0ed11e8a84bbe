//! # Lyrics Cache Service
//!
//! Serves lyrics lookups from a persistent cache and only calls external
//! providers on a miss.
//!
//! ## Features
//!
//! - Content-addressed cache rows keyed by normalized artist, title, album
//!   and duration
//! - 30-day expiry by default, computed from an injected clock
//! - Negative caching: "nothing found" is stored and served like a hit
//! - Provider fallback: MediaServer embedded lyrics, then the lyrics API
//! - Retry with exponential backoff per provider
//! - Background sweep of expired rows
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_metadata::lyrics::{LyricsCacheService, LyricsQuery};
//!
//! let service = LyricsCacheService::new(store, clock, ttl)
//!     .with_provider(Arc::new(MediaServerLyricsProvider::new(mediaserver)));
//!
//! let entry = service.get_lyrics(&LyricsQuery::new("Portishead", "Roads")).await?;
//! if entry.is_negative() {
//!     println!("no lyrics");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_library::repositories::{CacheStats, CacheStore};
use core_library::{LyricsCacheEntry, LyricsCacheKey, LyricsSource, SyncedLine};
use provider_mediaserver::MediaServerClient;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{MetadataError, Result};

#[cfg(feature = "lyrics-api")]
use bridge_traits::http::HttpClient;

// =============================================================================
// Core Types
// =============================================================================

/// Lyrics lookup parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LyricsQuery {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub album: Option<String>,
    /// Duration in seconds, kept as supplied
    #[serde(default)]
    pub duration: Option<String>,
}

impl LyricsQuery {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            album: None,
            duration: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn cache_key(&self) -> LyricsCacheKey {
        LyricsCacheKey::new(
            &self.artist,
            &self.title,
            self.album.as_deref(),
            self.duration.as_deref(),
        )
    }

    /// Duration rounded to whole seconds, if it parses as a number.
    pub fn duration_secs(&self) -> Option<u64> {
        self.duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64)
    }
}

/// What a provider found for a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderLyrics {
    pub plain_text: Option<String>,
    pub synced: Option<Vec<SyncedLine>>,
    pub is_instrumental: bool,
}

impl ProviderLyrics {
    pub fn has_lyrics(&self) -> bool {
        self.plain_text.as_deref().is_some_and(|t| !t.trim().is_empty())
            || self.synced.as_ref().is_some_and(|l| !l.is_empty())
    }

    pub fn instrumental() -> Self {
        Self {
            is_instrumental: true,
            ..Self::default()
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per provider, including the first
    pub max_attempts: usize,
    /// Base delay for exponential backoff
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
        }
    }

    /// Calculate backoff duration for attempt number
    fn backoff_duration(&self, attempt: usize) -> Duration {
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt as u32));
        Duration::from_millis(delay_ms.min(10_000)) // Cap at 10 seconds
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Trait for lyrics provider implementations
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Fetch lyrics for a track
    ///
    /// # Returns
    /// * `Ok(Some(lyrics))` if the provider knows the track
    /// * `Ok(None)` if lyrics were not found
    /// * `Err` on API error or network failure
    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<ProviderLyrics>>;

    /// Source recorded on entries this provider fills
    fn source(&self) -> LyricsSource;
}

// =============================================================================
// Lyrics Cache Service
// =============================================================================

/// Cache-first lyrics lookups with provider fallback.
pub struct LyricsCacheService {
    store: Arc<dyn CacheStore<LyricsCacheEntry>>,
    providers: Vec<Arc<dyn LyricsProvider>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    retry_config: RetryConfig,
}

impl LyricsCacheService {
    pub fn new(
        store: Arc<dyn CacheStore<LyricsCacheEntry>>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            providers: Vec::new(),
            clock,
            ttl,
            retry_config: RetryConfig::default(),
        }
    }

    /// Appends a provider; providers are tried in insertion order.
    pub fn with_provider(mut self, provider: Arc<dyn LyricsProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn provider_sources(&self) -> Vec<LyricsSource> {
        self.providers.iter().map(|p| p.source()).collect()
    }

    /// Returns cached lyrics, fetching and caching them on a miss.
    ///
    /// A negative entry is returned (and cached) when no provider has lyrics.
    /// If a provider failed instead of answering, the negative entry is
    /// returned but not cached, so the next lookup asks again.
    /// Cache failures are logged and never fail the lookup.
    #[instrument(skip(self), fields(artist = %query.artist, title = %query.title))]
    pub async fn get_lyrics(&self, query: &LyricsQuery) -> Result<LyricsCacheEntry> {
        let key = query.cache_key();
        if !key.is_valid() {
            return Err(MetadataError::Validation(
                "artist and title are required".to_string(),
            ));
        }

        let id = key.id();
        let now = self.clock.unix_timestamp();

        match self.store.get(&id).await {
            Ok(Some(entry)) if !entry.is_expired(now) => {
                debug!(negative = entry.is_negative(), "Lyrics cache hit");
                return Ok(entry);
            }
            Ok(Some(_)) => debug!("Lyrics cache entry expired"),
            Ok(None) => debug!("Lyrics cache miss"),
            Err(e) => warn!(error = %e, "Lyrics cache read failed, treating as miss"),
        }

        let (source, lyrics, provider_failed) = self.fetch_from_providers(query).await;

        let entry = LyricsCacheEntry {
            id,
            artist: query.artist.trim().to_string(),
            title: query.title.trim().to_string(),
            album: query
                .album
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            duration_seconds: key.duration,
            lyrics_text: lyrics.plain_text.filter(|t| !t.trim().is_empty()),
            synced_lyrics: lyrics.synced.filter(|l| !l.is_empty()),
            source_provider: source,
            is_instrumental: lyrics.is_instrumental,
            fetched_at: now,
            expires_at: now.saturating_add(self.ttl.as_secs() as i64),
        };

        if entry.is_negative() && provider_failed {
            warn!("Not caching negative lyrics result after a provider failure");
        } else if let Err(e) = self.store.upsert(&entry).await {
            warn!(error = %e, "Failed to cache lyrics");
        }

        info!(
            source = %entry.source_provider,
            negative = entry.is_negative(),
            "Lyrics lookup resolved"
        );
        Ok(entry)
    }

    /// Deletes expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self.store.purge_expired(self.clock.unix_timestamp()).await?;
        if removed > 0 {
            info!(removed, "Purged expired lyrics");
        }
        Ok(removed)
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.store.stats(self.clock.unix_timestamp()).await?)
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `interval` until
    /// `cancel` fires.
    pub fn spawn_cache_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Lyrics cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = service.purge_expired().await {
                            warn!(error = %e, "Lyrics cache sweep failed");
                        }
                    }
                }
            }
        })
    }

    /// First provider with lyrics wins; otherwise a negative result. The flag
    /// reports whether any provider failed rather than answering.
    async fn fetch_from_providers(
        &self,
        query: &LyricsQuery,
    ) -> (LyricsSource, ProviderLyrics, bool) {
        let mut instrumental = false;
        let mut failed = false;

        for provider in &self.providers {
            let source = provider.source();
            debug!(source = %source, "Attempting to fetch lyrics");

            match self.fetch_with_retry(provider.as_ref(), query).await {
                Ok(Some(lyrics)) if lyrics.has_lyrics() => {
                    return (source, lyrics, false);
                }
                Ok(Some(lyrics)) => {
                    instrumental |= lyrics.is_instrumental;
                    debug!(source = %source, "Provider returned no lyrics");
                }
                Ok(None) => debug!(source = %source, "Lyrics not found at provider"),
                Err(e) => {
                    warn!(source = %source, error = %e, "Provider fetch failed");
                    failed = true;
                }
            }
        }

        (
            LyricsSource::None,
            ProviderLyrics {
                is_instrumental: instrumental,
                ..ProviderLyrics::default()
            },
            failed,
        )
    }

    async fn fetch_with_retry(
        &self,
        provider: &dyn LyricsProvider,
        query: &LyricsQuery,
    ) -> Result<Option<ProviderLyrics>> {
        let max_attempts = self.retry_config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match provider.fetch(query).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(e);
                    }
                    let delay = self.retry_config.backoff_duration(attempt - 1);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// =============================================================================
// Provider Implementations
// =============================================================================

/// Lyrics embedded in MediaServer items.
pub struct MediaServerLyricsProvider {
    client: Arc<MediaServerClient>,
}

impl MediaServerLyricsProvider {
    pub fn new(client: Arc<MediaServerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LyricsProvider for MediaServerLyricsProvider {
    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<ProviderLyrics>> {
        let Some(item) = self.client.find_track(&query.artist, &query.title).await? else {
            return Ok(None);
        };

        let Some(lyrics) = self.client.fetch_lyrics(&item.id).await? else {
            return Ok(None);
        };

        let synced = lyrics.is_synced().then(|| {
            let mut lines: Vec<SyncedLine> = lyrics
                .lines
                .iter()
                .filter_map(|line| {
                    Some(SyncedLine {
                        time_offset_ms: line.start_ms?,
                        text: line.text.clone(),
                    })
                })
                .collect();
            lines.sort_by_key(|line| line.time_offset_ms);
            lines
        });

        Ok(Some(ProviderLyrics {
            plain_text: Some(lyrics.plain_text()),
            synced,
            is_instrumental: false,
        }))
    }

    fn source(&self) -> LyricsSource {
        LyricsSource::MediaServer
    }
}

#[cfg(feature = "lyrics-api")]
mod lyrics_api {
    use super::*;
    use crate::lrc;
    use bridge_traits::http::{HttpMethod, HttpRequest};
    use core_runtime::config::DEFAULT_REQUEST_TIMEOUT;

    /// LRCLIB-compatible lyrics API - free, synced lyrics
    pub struct LrcLibProvider {
        http_client: Arc<dyn HttpClient>,
        base_url: String,
        request_timeout: Duration,
    }

    impl LrcLibProvider {
        pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
            Self {
                http_client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            }
        }

        pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
            self.request_timeout = timeout;
            self
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct LrcLibResponse {
        #[serde(default)]
        synced_lyrics: Option<String>,
        #[serde(default)]
        plain_lyrics: Option<String>,
        #[serde(default)]
        instrumental: bool,
    }

    #[async_trait]
    impl LyricsProvider for LrcLibProvider {
        async fn fetch(&self, query: &LyricsQuery) -> Result<Option<ProviderLyrics>> {
            let mut url = format!(
                "{}/api/get?artist_name={}&track_name={}",
                self.base_url,
                urlencoding::encode(query.artist.trim()),
                urlencoding::encode(query.title.trim())
            );

            if let Some(album) = query.album.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                url.push_str(&format!("&album_name={}", urlencoding::encode(album)));
            }

            if let Some(duration) = query.duration_secs() {
                url.push_str(&format!("&duration={}", duration));
            }

            let request = HttpRequest::new(HttpMethod::Get, &url)
                .header("Accept", "application/json")
                .timeout(self.request_timeout);
            let response = self.http_client.execute(request).await?;

            if response.status == 404 {
                return Ok(None);
            }

            if !response.is_success() {
                return Err(MetadataError::LyricsFetchFailed(format!(
                    "Lyrics API error: HTTP {}",
                    response.status
                )));
            }

            let parsed: LrcLibResponse = response
                .json()
                .map_err(|e| MetadataError::JsonParse(e.to_string()))?;

            if parsed.instrumental {
                return Ok(Some(ProviderLyrics::instrumental()));
            }

            let synced = parsed
                .synced_lyrics
                .as_deref()
                .map(lrc::parse_lrc)
                .filter(|lines| !lines.is_empty());

            let plain_text = parsed
                .plain_lyrics
                .filter(|text| !text.trim().is_empty())
                .or_else(|| {
                    synced.as_ref().map(|lines| {
                        lines
                            .iter()
                            .map(|line| line.text.as_str())
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                });

            Ok(Some(ProviderLyrics {
                plain_text,
                synced,
                is_instrumental: false,
            }))
        }

        fn source(&self) -> LyricsSource {
            LyricsSource::LyricsApi
        }
    }
}

#[cfg(feature = "lyrics-api")]
pub use lyrics_api::LrcLibProvider;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use core_library::db::create_test_pool;
    use core_library::error::{LibraryError, Result as LibraryResult};
    use core_library::repositories::{InMemoryCacheStore, SqliteLyricsCacheStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const THIRTY_DAYS: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    struct FixedClock(StdMutex<DateTime<Utc>>);

    impl FixedClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(StdMutex::new(
                DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            )))
        }

        fn advance(&self, by: chrono::Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Returns the same outcome on every call and counts calls.
    struct StubProvider {
        source: LyricsSource,
        outcome: fn() -> Result<Option<ProviderLyrics>>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(source: LyricsSource, outcome: fn() -> Result<Option<ProviderLyrics>>) -> Arc<Self> {
            Arc::new(Self {
                source,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LyricsProvider for StubProvider {
        async fn fetch(&self, _query: &LyricsQuery) -> Result<Option<ProviderLyrics>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }

        fn source(&self) -> LyricsSource {
            self.source
        }
    }

    fn found() -> Result<Option<ProviderLyrics>> {
        Ok(Some(ProviderLyrics {
            plain_text: Some("Hello\nWorld".to_string()),
            synced: Some(vec![
                SyncedLine {
                    time_offset_ms: 1_000,
                    text: "Hello".to_string(),
                },
                SyncedLine {
                    time_offset_ms: 2_000,
                    text: "World".to_string(),
                },
            ]),
            is_instrumental: false,
        }))
    }

    fn not_found() -> Result<Option<ProviderLyrics>> {
        Ok(None)
    }

    fn failing() -> Result<Option<ProviderLyrics>> {
        Err(MetadataError::LyricsFetchFailed("HTTP 503".to_string()))
    }

    fn instrumental() -> Result<Option<ProviderLyrics>> {
        Ok(Some(ProviderLyrics::instrumental()))
    }

    fn service(
        store: Arc<dyn CacheStore<LyricsCacheEntry>>,
        clock: Arc<FixedClock>,
        providers: &[Arc<StubProvider>],
    ) -> LyricsCacheService {
        providers.iter().fold(
            LyricsCacheService::new(store, clock, THIRTY_DAYS)
                .with_retry_config(RetryConfig::none()),
            |service, provider| service.with_provider(provider.clone()),
        )
    }

    fn memory_store() -> Arc<InMemoryCacheStore<LyricsCacheEntry>> {
        Arc::new(InMemoryCacheStore::new())
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl CacheStore<LyricsCacheEntry> for BrokenStore {
        async fn get(&self, _key: &str) -> LibraryResult<Option<LyricsCacheEntry>> {
            Err(LibraryError::Cache("read failed".into()))
        }
        async fn upsert(&self, _entry: &LyricsCacheEntry) -> LibraryResult<()> {
            Err(LibraryError::Cache("write failed".into()))
        }
        async fn remove(&self, _key: &str) -> LibraryResult<bool> {
            Err(LibraryError::Cache("remove failed".into()))
        }
        async fn purge_expired(&self, _now: i64) -> LibraryResult<u64> {
            Err(LibraryError::Cache("purge failed".into()))
        }
        async fn stats(&self, _now: i64) -> LibraryResult<CacheStats> {
            Err(LibraryError::Cache("stats failed".into()))
        }
    }

    #[test]
    fn test_retry_config_backoff() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_duration(0).as_millis(), 100);
        assert_eq!(config.backoff_duration(1).as_millis(), 200);
        assert_eq!(config.backoff_duration(2).as_millis(), 400);
        assert_eq!(config.backoff_duration(10).as_millis(), 10_000);
    }

    #[test]
    fn test_query_duration_secs() {
        assert_eq!(LyricsQuery::new("a", "b").with_duration("215.6").duration_secs(), Some(216));
        assert_eq!(LyricsQuery::new("a", "b").with_duration("n/a").duration_secs(), None);
        assert_eq!(LyricsQuery::new("a", "b").duration_secs(), None);
    }

    #[tokio::test]
    async fn test_lookup_is_idempotent_within_ttl() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, found);
        let store = Arc::new(SqliteLyricsCacheStore::from_pool(create_test_pool().await.unwrap()));
        let service = service(store, clock.clone(), &[provider.clone()]);
        let query = LyricsQuery::new("Portishead", "Roads");

        let first = service.get_lyrics(&query).await.unwrap();
        clock.advance(chrono::Duration::days(29));
        let second = service.get_lyrics(&query).await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.source_provider, LyricsSource::LyricsApi);
        assert_eq!(first.expires_at, first.fetched_at + THIRTY_DAYS.as_secs() as i64);
        assert_eq!(first.synced_lyrics.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_normalized_queries_share_entry() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, found);
        let service = service(memory_store(), clock, &[provider.clone()]);

        service
            .get_lyrics(&LyricsQuery::new("Portishead", "Roads"))
            .await
            .unwrap();
        service
            .get_lyrics(&LyricsQuery::new("  PORTISHEAD ", "roads"))
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, not_found);
        let store = memory_store();
        let service = service(store.clone(), clock, &[provider.clone()]);
        let query = LyricsQuery::new("Unknown", "Track");

        let first = service.get_lyrics(&query).await.unwrap();
        let second = service.get_lyrics(&query).await.unwrap();

        assert!(first.is_negative());
        assert_eq!(first.source_provider, LyricsSource::None);
        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, found);
        let store = memory_store();
        let service = service(store.clone(), clock.clone(), &[provider.clone()]);
        let query = LyricsQuery::new("Portishead", "Roads");

        let first = service.get_lyrics(&query).await.unwrap();
        clock.advance(chrono::Duration::days(31));
        let second = service.get_lyrics(&query).await.unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(second.id, first.id);
        assert!(second.fetched_at > first.fetched_at);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&first.id).await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn test_missing_and_zero_duration_are_distinct() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, found);
        let store = memory_store();
        let service = service(store.clone(), clock, &[provider.clone()]);

        let without = service
            .get_lyrics(&LyricsQuery::new("A", "T"))
            .await
            .unwrap();
        let zero = service
            .get_lyrics(&LyricsQuery::new("A", "T").with_duration("0"))
            .await
            .unwrap();

        assert_ne!(without.id, zero.id);
        assert_eq!(zero.duration_seconds.as_deref(), Some("0"));
        assert_eq!(provider.calls(), 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let clock = FixedClock::new();
        let mediaserver = StubProvider::new(LyricsSource::MediaServer, failing);
        let lyrics_api = StubProvider::new(LyricsSource::LyricsApi, found);
        let service = service(
            memory_store(),
            clock,
            &[mediaserver.clone(), lyrics_api.clone()],
        );

        let entry = service
            .get_lyrics(&LyricsQuery::new("A", "T"))
            .await
            .unwrap();

        assert_eq!(entry.source_provider, LyricsSource::LyricsApi);
        assert_eq!(mediaserver.calls(), 1);
        assert_eq!(lyrics_api.calls(), 1);
    }

    #[tokio::test]
    async fn test_first_provider_with_lyrics_wins() {
        let clock = FixedClock::new();
        let mediaserver = StubProvider::new(LyricsSource::MediaServer, found);
        let lyrics_api = StubProvider::new(LyricsSource::LyricsApi, found);
        let service = service(
            memory_store(),
            clock,
            &[mediaserver.clone(), lyrics_api.clone()],
        );

        let entry = service
            .get_lyrics(&LyricsQuery::new("A", "T"))
            .await
            .unwrap();

        assert_eq!(entry.source_provider, LyricsSource::MediaServer);
        assert_eq!(lyrics_api.calls(), 0);
    }

    #[tokio::test]
    async fn test_instrumental_flag_on_negative_entry() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, instrumental);
        let service = service(memory_store(), clock, &[provider]);

        let entry = service
            .get_lyrics(&LyricsQuery::new("Boards of Canada", "Roygbiv"))
            .await
            .unwrap();

        assert!(entry.is_negative());
        assert!(entry.is_instrumental);
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_cached() {
        let clock = FixedClock::new();
        let mediaserver = StubProvider::new(LyricsSource::MediaServer, not_found);
        let lyrics_api = StubProvider::new(LyricsSource::LyricsApi, failing);
        let store = memory_store();
        let service = service(
            store.clone(),
            clock,
            &[mediaserver.clone(), lyrics_api.clone()],
        );
        let query = LyricsQuery::new("Portishead", "Roads");

        let first = service.get_lyrics(&query).await.unwrap();
        let second = service.get_lyrics(&query).await.unwrap();

        assert!(first.is_negative());
        assert!(second.is_negative());
        assert_eq!(lyrics_api.calls(), 2);
        assert_eq!(mediaserver.calls(), 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_retries_failing_provider() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, failing);
        let service = LyricsCacheService::new(memory_store(), clock, THIRTY_DAYS)
            .with_provider(provider.clone())
            .with_retry_config(RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1,
            });

        let entry = service
            .get_lyrics(&LyricsQuery::new("A", "T"))
            .await
            .unwrap();

        assert!(entry.is_negative());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_blank_artist_is_rejected() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, found);
        let service = service(memory_store(), clock, &[provider.clone()]);

        let result = service.get_lyrics(&LyricsQuery::new("   ", "Roads")).await;

        assert!(matches!(result, Err(MetadataError::Validation(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failures_do_not_fail_lookup() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, found);
        let service = service(Arc::new(BrokenStore), clock, &[provider.clone()]);
        let query = LyricsQuery::new("A", "T");

        let first = service.get_lyrics(&query).await.unwrap();
        let second = service.get_lyrics(&query).await.unwrap();

        assert!(first.has_lyrics());
        assert_eq!(first.lyrics_text, second.lyrics_text);
        assert_eq!(provider.calls(), 2);
        assert!(service.cache_stats().await.is_err());
    }

    #[tokio::test]
    async fn test_purge_and_stats() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, not_found);
        let store = Arc::new(SqliteLyricsCacheStore::from_pool(create_test_pool().await.unwrap()));
        let service = service(store, clock.clone(), &[provider]);

        service.get_lyrics(&LyricsQuery::new("A", "old")).await.unwrap();
        clock.advance(chrono::Duration::days(20));
        service.get_lyrics(&LyricsQuery::new("A", "new")).await.unwrap();
        clock.advance(chrono::Duration::days(15));

        let stats = service.cache_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.negative, 2);
        assert_eq!(stats.expired, 1);

        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert_eq!(service.cache_stats().await.unwrap().total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sweeper_purges_until_cancelled() {
        let clock = FixedClock::new();
        let provider = StubProvider::new(LyricsSource::LyricsApi, not_found);
        let store = memory_store();
        let service = Arc::new(service(store.clone(), clock.clone(), &[provider]));

        service.get_lyrics(&LyricsQuery::new("A", "T")).await.unwrap();
        clock.advance(chrono::Duration::days(31));

        let cancel = CancellationToken::new();
        let handle = service.spawn_cache_sweeper(Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty().await);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
