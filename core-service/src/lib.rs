//! Core service façade and HTTP surface.
//!
//! [`CoreService`] wires the configured bridges, repositories and external
//! clients into the operations the client calls: similar and top tracks with
//! library enrichment, the MediaServer album proxy, and cached lyrics.
//! [`api::build_router`] exposes them over HTTP.
//!
//! Missing configuration never fails startup. A service without a TrackGraph
//! key or MediaServer URL answers the affected routes with typed
//! "not configured" errors.

pub mod api;
pub mod error;

pub use error::{CoreError, ErrorKind, Result};

use std::sync::Arc;

use bridge_traits::database::DatabaseConfig;
use bridge_traits::http::HttpClient;
use bridge_traits::time::{Clock, SystemClock};
use core_auth::MediaServerSession;
use core_library::db::create_pool;
use core_library::repositories::{
    CacheStats, SqliteLyricsCacheStore, SqliteTrackRepository, TrackRepository,
};
use core_library::LyricsCacheEntry;
use core_metadata::lyrics::MediaServerLyricsProvider;
use core_metadata::providers::trackgraph::{parse_limit, DEFAULT_SIMILAR_LIMIT, DEFAULT_TOP_LIMIT};
use core_metadata::{
    EnrichedTrack, LibraryEnrichment, LyricsCacheService, LyricsQuery, SimilarTrack, TopTrack,
    TrackGraphClient,
};
use core_runtime::config::CoreConfig;
use provider_mediaserver::{MediaServerClient, ProxyRequest, ProxyResponse};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Primary façade exposed to the HTTP layer and host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    media_server: Arc<MediaServerClient>,
    track_graph: Arc<TrackGraphClient>,
    enrichment: LibraryEnrichment,
    lyrics: Arc<LyricsCacheService>,
    shutdown: CancellationToken,
}

impl CoreService {
    /// Opens the database, builds every component and starts the lyrics
    /// cache sweeper when one is configured.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let pool = create_pool(&DatabaseConfig::new(config.database_path.clone())).await?;
        let service = Self::with_pool(config, pool)?;
        service.start_cache_sweeper();
        Ok(service)
    }

    /// Builds the service on an existing, migrated pool.
    pub fn with_pool(config: CoreConfig, pool: SqlitePool) -> Result<Self> {
        Self::with_clock(config, pool, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CoreConfig, pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self> {
        let http_client: Arc<dyn HttpClient> = config.http_client.clone().ok_or_else(|| {
            CoreError::InitializationFailed("no HTTP client configured".to_string())
        })?;

        let session = Arc::new(MediaServerSession::with_clock(
            config.media_server.clone(),
            Arc::clone(&http_client),
            Arc::clone(&clock),
        ));
        let media_server = Arc::new(
            MediaServerClient::new(session, Arc::clone(&http_client))
                .with_request_timeout(config.request_timeout),
        );

        let track_graph = Arc::new(
            TrackGraphClient::new(Arc::clone(&http_client), &config.metadata_api_config)
                .with_request_timeout(config.request_timeout),
        );

        let tracks: Arc<dyn TrackRepository> =
            Arc::new(SqliteTrackRepository::from_pool(pool.clone()));
        let enrichment = LibraryEnrichment::new(tracks);

        let mut lyrics = LyricsCacheService::new(
            Arc::new(SqliteLyricsCacheStore::from_pool(pool)),
            clock,
            config.lyrics.ttl,
        );
        if media_server.is_configured() {
            lyrics = lyrics.with_provider(Arc::new(MediaServerLyricsProvider::new(Arc::clone(
                &media_server,
            ))));
        }
        #[cfg(feature = "lyrics-api")]
        {
            if config.lyrics.lyrics_api_enabled {
                lyrics = lyrics.with_provider(Arc::new(
                    core_metadata::lyrics::LrcLibProvider::new(
                        Arc::clone(&http_client),
                        config.lyrics.lyrics_api_url.clone(),
                    )
                    .with_request_timeout(config.request_timeout),
                ));
            }
        }

        info!(
            mediaserver = media_server.is_configured(),
            trackgraph = track_graph.is_configured(),
            lyrics_providers = ?lyrics.provider_sources(),
            "Core service initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            media_server,
            track_graph,
            enrichment,
            lyrics: Arc::new(lyrics),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Spawns the periodic purge of expired lyrics, if an interval is set.
    /// Stops on [`shutdown`](Self::shutdown).
    pub fn start_cache_sweeper(&self) {
        if let Some(interval) = self.config.lyrics.sweep_interval {
            self.lyrics
                .spawn_cache_sweeper(interval, self.shutdown.child_token());
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Similar tracks for `artist`/`track`, annotated with library presence.
    #[instrument(skip(self))]
    pub async fn similar_tracks(
        &self,
        artist: &str,
        track: &str,
        limit: Option<&str>,
    ) -> Result<Vec<EnrichedTrack<SimilarTrack>>> {
        let artist = required("artist", artist)?;
        let track = required("track", track)?;
        let limit = parse_limit(limit, DEFAULT_SIMILAR_LIMIT);

        let tracks = self
            .track_graph
            .get_similar_tracks(artist, track, limit)
            .await?;
        Ok(self.enrichment.enrich(tracks).await)
    }

    /// Most played tracks of `artist`, annotated with library presence.
    #[instrument(skip(self))]
    pub async fn top_tracks(
        &self,
        artist: &str,
        limit: Option<&str>,
    ) -> Result<Vec<EnrichedTrack<TopTrack>>> {
        let artist = required("artist", artist)?;
        let limit = parse_limit(limit, DEFAULT_TOP_LIMIT);

        let tracks = self.track_graph.get_top_tracks(artist, limit).await?;
        Ok(self.enrichment.enrich(tracks).await)
    }

    /// Forwards an album lookup to the MediaServer.
    #[instrument(skip(self, query))]
    pub async fn proxy_album(
        &self,
        album_id: &str,
        query: Vec<(String, String)>,
    ) -> Result<ProxyResponse> {
        let album_id = required("id", album_id)?;
        Ok(self
            .media_server
            .proxy(ProxyRequest::album(album_id, query))
            .await?)
    }

    pub async fn lyrics(&self, query: &LyricsQuery) -> Result<LyricsCacheEntry> {
        required("artist", &query.artist)?;
        required("title", &query.title)?;
        Ok(self.lyrics.get_lyrics(query).await?)
    }

    pub async fn lyrics_cache_stats(&self) -> Result<CacheStats> {
        Ok(self.lyrics.cache_stats().await?)
    }
}

fn required<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{} is required", name)));
    }
    Ok(value)
}
