//! Library index repository

use crate::error::{LibraryError, Result};
use crate::models::{normalize_text, LibraryTrack};
use crate::repositories::row::{get_i64, get_optional_i64, get_optional_string, get_string};
use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Upper bound on bound parameters per lookup query.
const MAX_ARTISTS_PER_QUERY: usize = 500;

/// Track repository interface for the local library index
#[async_trait::async_trait]
pub trait TrackRepository: Send + Sync {
    /// Find a track by ID
    ///
    /// # Returns
    /// - `Ok(Some(track))` if found
    /// - `Ok(None)` if not found
    async fn find_by_id(&self, id: &str) -> Result<Option<LibraryTrack>>;

    /// Insert a new track
    ///
    /// # Errors
    /// Returns error if the track fails validation or the id already exists
    async fn insert(&self, track: &LibraryTrack) -> Result<()>;

    /// All tracks whose normalized artist is one of `artists`
    ///
    /// `artists` are normalized before matching. Results are ordered by
    /// `created_at`, then `id`, so the first row for a given artist and title
    /// is the oldest one.
    async fn find_by_artists(&self, artists: &[String]) -> Result<Vec<LibraryTrack>>;

    /// Count total tracks
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of TrackRepository
pub struct SqliteTrackRepository {
    adapter: Arc<dyn DatabaseAdapter>,
}

impl SqliteTrackRepository {
    /// Create a new repository with the given database adapter
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self { adapter }
    }

    /// Create a new repository from a SQLite connection pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        use crate::adapters::SqliteAdapter;
        Self::new(Arc::new(SqliteAdapter::from_pool(pool)))
    }

    fn row_to_track(row: QueryRow) -> Result<LibraryTrack> {
        Ok(LibraryTrack {
            id: get_string(&row, "id")?,
            title: get_string(&row, "title")?,
            artist: get_string(&row, "artist")?,
            album: get_optional_string(&row, "album"),
            duration_ms: get_optional_i64(&row, "duration_ms"),
            normalized_title: get_string(&row, "normalized_title")?,
            normalized_artist: get_string(&row, "normalized_artist")?,
            created_at: get_i64(&row, "created_at")?,
        })
    }
}

#[async_trait::async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<LibraryTrack>> {
        let sql = "SELECT * FROM tracks WHERE id = ?";
        let params = vec![QueryValue::Text(id.to_string())];

        match self.adapter.query_one_optional(sql, &params).await? {
            Some(row) => Ok(Some(Self::row_to_track(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, track: &LibraryTrack) -> Result<()> {
        track
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "track".to_string(),
                message,
            })?;

        let sql = r#"
            INSERT INTO tracks (
                id, title, artist, album, duration_ms,
                normalized_title, normalized_artist, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let params = vec![
            QueryValue::Text(track.id.clone()),
            QueryValue::Text(track.title.clone()),
            QueryValue::Text(track.artist.clone()),
            track.album.clone().into(),
            track.duration_ms.into(),
            QueryValue::Text(normalize_text(&track.title)),
            QueryValue::Text(normalize_text(&track.artist)),
            QueryValue::Integer(track.created_at),
        ];

        self.adapter.execute(sql, &params).await?;
        Ok(())
    }

    async fn find_by_artists(&self, artists: &[String]) -> Result<Vec<LibraryTrack>> {
        let mut normalized: Vec<String> = artists
            .iter()
            .map(|a| normalize_text(a))
            .filter(|a| !a.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();

        let mut tracks = Vec::new();
        for chunk in normalized.chunks(MAX_ARTISTS_PER_QUERY) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT * FROM tracks WHERE normalized_artist IN ({}) ORDER BY created_at, id",
                placeholders
            );
            let params: Vec<QueryValue> = chunk.iter().cloned().map(QueryValue::Text).collect();

            for row in self.adapter.query(&sql, &params).await? {
                tracks.push(Self::row_to_track(row)?);
            }
        }

        if normalized.len() > MAX_ARTISTS_PER_QUERY {
            tracks.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        }

        Ok(tracks)
    }

    async fn count(&self) -> Result<i64> {
        let row = self
            .adapter
            .query_one("SELECT COUNT(*) as count FROM tracks", &[])
            .await?;
        get_i64(&row, "count")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn repo() -> SqliteTrackRepository {
        SqliteTrackRepository::from_pool(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_insert_and_find_track() {
        let repo = repo().await;
        let track = LibraryTrack::new("track-1", "Daft Punk", "Aerodynamic", 1_699_200_000)
            .with_album("Discovery")
            .with_duration_ms(212_000);

        repo.insert(&track).await.unwrap();

        let found = repo.find_by_id("track-1").await.unwrap().unwrap();
        assert_eq!(found, track);
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_track() {
        let repo = repo().await;
        let track = LibraryTrack::new("track-1", "Daft Punk", "   ", 0);

        assert!(matches!(
            repo.insert(&track).await,
            Err(LibraryError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_id_fails() {
        let repo = repo().await;
        let track = LibraryTrack::new("track-1", "A", "T", 0);
        repo.insert(&track).await.unwrap();

        assert!(repo.insert(&track).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_artists_normalizes_and_orders() {
        let repo = repo().await;
        repo.insert(&LibraryTrack::new("b", "The Beatles", "Let It Be", 20))
            .await
            .unwrap();
        repo.insert(&LibraryTrack::new("a", "the  beatles", "LET IT BE", 20))
            .await
            .unwrap();
        repo.insert(&LibraryTrack::new("c", "THE BEATLES", "Help!", 10))
            .await
            .unwrap();
        repo.insert(&LibraryTrack::new("d", "Queen", "Bohemian Rhapsody", 5))
            .await
            .unwrap();

        let found = repo
            .find_by_artists(&[" the beatles ".to_string(), "The Beatles".to_string()])
            .await
            .unwrap();

        let ids: Vec<&str> = found.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_find_by_artists_empty_input() {
        let repo = repo().await;
        assert!(repo.find_by_artists(&[]).await.unwrap().is_empty());
        assert!(repo
            .find_by_artists(&["   ".to_string()])
            .await
            .unwrap()
            .is_empty());
    }
}
