//! SQLite-backed lyrics cache (`lyrics_cache` table)

use crate::error::{LibraryError, Result};
use crate::models::{LyricsCacheEntry, LyricsSource, SyncedLine};
use crate::repositories::cache::{CacheStats, CacheStore};
use crate::repositories::row::{get_i64, get_optional_string, get_string};
use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, instrument};

const UPSERT_SQL: &str = r#"
    INSERT INTO lyrics_cache (
        id, artist, title, album, duration_seconds, lyrics_text, synced_lyrics,
        source_provider, is_instrumental, fetched_at, expires_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        artist = excluded.artist,
        title = excluded.title,
        album = excluded.album,
        duration_seconds = excluded.duration_seconds,
        lyrics_text = excluded.lyrics_text,
        synced_lyrics = excluded.synced_lyrics,
        source_provider = excluded.source_provider,
        is_instrumental = excluded.is_instrumental,
        fetched_at = excluded.fetched_at,
        expires_at = excluded.expires_at
"#;

/// SQLite implementation of `CacheStore<LyricsCacheEntry>`
pub struct SqliteLyricsCacheStore {
    adapter: Arc<dyn DatabaseAdapter>,
}

impl SqliteLyricsCacheStore {
    /// Create a new store with the given database adapter
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self { adapter }
    }

    /// Create a new store from a SQLite connection pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        use crate::adapters::SqliteAdapter;
        Self::new(Arc::new(SqliteAdapter::from_pool(pool)))
    }

    fn row_to_entry(row: QueryRow) -> Result<LyricsCacheEntry> {
        let source = get_string(&row, "source_provider")?;
        let source_provider = source
            .parse::<LyricsSource>()
            .map_err(LibraryError::Cache)?;

        let synced_lyrics = match get_optional_string(&row, "synced_lyrics") {
            Some(json) => Some(serde_json::from_str::<Vec<SyncedLine>>(&json).map_err(|e| {
                LibraryError::Cache(format!("Corrupt synced lyrics: {}", e))
            })?),
            None => None,
        };

        Ok(LyricsCacheEntry {
            id: get_string(&row, "id")?,
            artist: get_string(&row, "artist")?,
            title: get_string(&row, "title")?,
            album: get_optional_string(&row, "album"),
            duration_seconds: get_optional_string(&row, "duration_seconds"),
            lyrics_text: get_optional_string(&row, "lyrics_text"),
            synced_lyrics,
            source_provider,
            is_instrumental: get_i64(&row, "is_instrumental")? != 0,
            fetched_at: get_i64(&row, "fetched_at")?,
            expires_at: get_i64(&row, "expires_at")?,
        })
    }

    fn upsert_params(entry: &LyricsCacheEntry) -> Result<Vec<QueryValue>> {
        let synced = match &entry.synced_lyrics {
            Some(lines) => Some(serde_json::to_string(lines).map_err(|e| {
                LibraryError::Cache(format!("Failed to encode synced lyrics: {}", e))
            })?),
            None => None,
        };

        Ok(vec![
            QueryValue::Text(entry.id.clone()),
            QueryValue::Text(entry.artist.clone()),
            QueryValue::Text(entry.title.clone()),
            entry.album.clone().into(),
            entry.duration_seconds.clone().into(),
            entry.lyrics_text.clone().into(),
            synced.into(),
            QueryValue::Text(entry.source_provider.as_str().to_string()),
            entry.is_instrumental.into(),
            QueryValue::Integer(entry.fetched_at),
            QueryValue::Integer(entry.expires_at),
        ])
    }
}

#[async_trait::async_trait]
impl CacheStore<LyricsCacheEntry> for SqliteLyricsCacheStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<LyricsCacheEntry>> {
        let sql = "SELECT * FROM lyrics_cache WHERE id = ?";
        let params = vec![QueryValue::Text(key.to_string())];

        match self.adapter.query_one_optional(sql, &params).await? {
            Some(row) => Ok(Some(Self::row_to_entry(row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, entry), fields(id = %entry.id, source = %entry.source_provider))]
    async fn upsert(&self, entry: &LyricsCacheEntry) -> Result<()> {
        entry.validate().map_err(|message| LibraryError::InvalidInput {
            field: "lyrics_cache".to_string(),
            message,
        })?;

        let params = Self::upsert_params(entry)?;
        self.adapter.execute(UPSERT_SQL, &params).await?;
        debug!("Lyrics cache entry stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let affected = self
            .adapter
            .execute(
                "DELETE FROM lyrics_cache WHERE id = ?",
                &[QueryValue::Text(key.to_string())],
            )
            .await?;
        Ok(affected > 0)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let removed = self
            .adapter
            .execute(
                "DELETE FROM lyrics_cache WHERE expires_at < ?",
                &[QueryValue::Integer(now)],
            )
            .await?;
        debug!(removed, "Purged expired lyrics cache entries");
        Ok(removed)
    }

    async fn stats(&self, now: i64) -> Result<CacheStats> {
        let row = self
            .adapter
            .query_one(
                r#"
                SELECT
                    COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN source_provider = 'none'
                        AND lyrics_text IS NULL AND synced_lyrics IS NULL
                        THEN 1 ELSE 0 END), 0) AS negative,
                    COALESCE(SUM(CASE WHEN expires_at < ? THEN 1 ELSE 0 END), 0) AS expired
                FROM lyrics_cache
                "#,
                &[QueryValue::Integer(now)],
            )
            .await?;

        Ok(CacheStats {
            total: get_i64(&row, "total")?.max(0) as u64,
            negative: get_i64(&row, "negative")?.max(0) as u64,
            expired: get_i64(&row, "expired")?.max(0) as u64,
        })
    }
}
