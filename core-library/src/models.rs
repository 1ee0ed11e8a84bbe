//! Domain models for the library index and the lyrics cache
//!
//! This module contains the persisted models with validation and the key
//! derivation used to content-address lyrics cache rows.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Lowercase, trim and collapse internal whitespace runs to a single space.
///
/// Shared by library lookups and lyrics cache keys so both sides of a
/// comparison are normalized the same way.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// =============================================================================
// Library Index
// =============================================================================

/// A track of the local library, reduced to the shape needed for lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryTrack {
    /// Unique identifier
    pub id: String,
    /// Track title as stored
    pub title: String,
    /// Track artist as stored
    pub artist: String,
    /// Album name
    pub album: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: Option<i64>,
    /// Normalized title for matching
    pub normalized_title: String,
    /// Normalized artist for matching
    pub normalized_artist: String,
    /// Creation timestamp (unix seconds)
    pub created_at: i64,
}

impl LibraryTrack {
    pub fn new(
        id: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
        created_at: i64,
    ) -> Self {
        let artist = artist.into();
        let title = title.into();
        Self {
            id: id.into(),
            normalized_title: normalize_text(&title),
            normalized_artist: normalize_text(&artist),
            title,
            artist,
            album: None,
            duration_ms: None,
            created_at,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Track id cannot be empty".to_string());
        }

        if self.title.trim().is_empty() {
            return Err("Track title cannot be empty".to_string());
        }

        if self.artist.trim().is_empty() {
            return Err("Track artist cannot be empty".to_string());
        }

        if let Some(duration) = self.duration_ms {
            if duration <= 0 {
                return Err("Track duration must be positive".to_string());
            }
        }

        Ok(())
    }
}

// =============================================================================
// Lyrics Cache
// =============================================================================

/// Where a cached lyrics result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LyricsSource {
    /// Lyrics embedded in the MediaServer library
    #[serde(rename = "mediaserver")]
    MediaServer,
    /// The public lyrics API
    #[serde(rename = "lyricsapi")]
    LyricsApi,
    /// Nothing was found (negative entry)
    None,
}

impl LyricsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LyricsSource::MediaServer => "mediaserver",
            LyricsSource::LyricsApi => "lyricsapi",
            LyricsSource::None => "none",
        }
    }
}

impl fmt::Display for LyricsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LyricsSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mediaserver" => Ok(LyricsSource::MediaServer),
            "lyricsapi" => Ok(LyricsSource::LyricsApi),
            "none" => Ok(LyricsSource::None),
            other => Err(format!("Unknown lyrics source: {}", other)),
        }
    }
}

/// One timed line of synced lyrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedLine {
    pub time_offset_ms: u64,
    pub text: String,
}

/// Normalized identity of a lyrics lookup.
///
/// Two queries that differ only in case or whitespace map to the same key.
/// Absent optional fields are kept distinct from present ones, so a missing
/// duration and a duration of `"0"` produce different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LyricsCacheKey {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    pub duration: Option<String>,
}

impl LyricsCacheKey {
    pub fn new(artist: &str, title: &str, album: Option<&str>, duration: Option<&str>) -> Self {
        Self {
            artist: normalize_text(artist),
            title: normalize_text(title),
            album: album
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty()),
            duration: duration
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        }
    }

    /// Artist and title are both required.
    pub fn is_valid(&self) -> bool {
        !self.artist.is_empty() && !self.title.is_empty()
    }

    /// Lowercase hex SHA-256 over a length-prefixed encoding of the key.
    pub fn id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::encode_required(&self.artist));
        hasher.update(Self::encode_required(&self.title));
        hasher.update(Self::encode_optional(self.album.as_deref()));
        hasher.update(Self::encode_optional(self.duration.as_deref()));

        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    fn encode_required(value: &str) -> String {
        format!("{}:{};", value.len(), value)
    }

    fn encode_optional(value: Option<&str>) -> String {
        match value {
            Some(v) => format!("+{}:{};", v.len(), v),
            None => "-;".to_string(),
        }
    }
}

/// A persisted lyrics lookup result, positive or negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsCacheEntry {
    /// Content address, see [`LyricsCacheKey::id`]
    pub id: String,
    /// Artist as supplied (trimmed)
    pub artist: String,
    /// Title as supplied (trimmed)
    pub title: String,
    pub album: Option<String>,
    /// String-encoded duration in seconds
    pub duration_seconds: Option<String>,
    pub lyrics_text: Option<String>,
    /// Ascending by `time_offset_ms`
    pub synced_lyrics: Option<Vec<SyncedLine>>,
    pub source_provider: LyricsSource,
    pub is_instrumental: bool,
    /// Unix seconds
    pub fetched_at: i64,
    /// Unix seconds
    pub expires_at: i64,
}

impl LyricsCacheEntry {
    /// An entry recording that no provider had lyrics.
    pub fn is_negative(&self) -> bool {
        self.source_provider == LyricsSource::None
            && self.lyrics_text.is_none()
            && self.synced_lyrics.is_none()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }

    pub fn has_lyrics(&self) -> bool {
        self.lyrics_text.as_deref().is_some_and(|t| !t.is_empty())
            || self.synced_lyrics.as_ref().is_some_and(|l| !l.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Cache entry id cannot be empty".to_string());
        }

        if self.artist.trim().is_empty() || self.title.trim().is_empty() {
            return Err("Cache entry requires artist and title".to_string());
        }

        if self.expires_at < self.fetched_at {
            return Err("Cache entry expires before it was fetched".to_string());
        }

        if let Some(lines) = &self.synced_lyrics {
            if lines
                .windows(2)
                .any(|pair| pair[0].time_offset_ms > pair[1].time_offset_ms)
            {
                return Err("Synced lyrics must be ordered by time".to_string());
            }
        }

        if self.source_provider == LyricsSource::None && self.has_lyrics() {
            return Err("Negative cache entry cannot carry lyrics".to_string());
        }

        Ok(())
    }
}
