//! MediaServer API types
//!
//! Wire types for the Jellyfin-compatible item and lyrics endpoints, plus the
//! proxy request/response pair handed to the HTTP layer.

use std::collections::HashMap;

use bridge_traits::HttpMethod;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Audio ticks per millisecond (ticks are 100 ns)
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Item resource returned by `/Items`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaItem {
    /// Item ID
    pub id: String,

    /// Display name (track title for audio items)
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,

    /// Track artists
    #[serde(default)]
    pub artists: Vec<String>,

    /// Duration in 100 ns ticks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_time_ticks: Option<i64>,
}

impl MediaItem {
    pub fn duration_ms(&self) -> Option<u64> {
        self.run_time_ticks
            .filter(|ticks| *ticks >= 0)
            .map(|ticks| (ticks / TICKS_PER_MILLISECOND) as u64)
    }

    /// Track artists followed by the album artist, if any.
    pub fn all_artists(&self) -> impl Iterator<Item = &str> {
        self.artists
            .iter()
            .map(String::as_str)
            .chain(self.album_artist.as_deref())
    }
}

/// `/Items` query response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<MediaItem>,
}

/// `/Audio/{id}/Lyrics` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct LyricsResponse {
    #[serde(default)]
    pub lyrics: Vec<LyricLineDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct LyricLineDto {
    #[serde(default)]
    pub text: String,
    /// Offset in 100 ns ticks; absent for unsynced lyrics
    #[serde(default)]
    pub start: Option<i64>,
}

/// One line of lyrics embedded in a MediaServer item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub start_ms: Option<u64>,
    pub text: String,
}

/// Lyrics embedded in a MediaServer item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaServerLyrics {
    pub lines: Vec<LyricLine>,
}

impl MediaServerLyrics {
    pub(crate) fn from_response(response: LyricsResponse) -> Self {
        let lines = response
            .lyrics
            .into_iter()
            .map(|line| LyricLine {
                start_ms: line
                    .start
                    .filter(|ticks| *ticks >= 0)
                    .map(|ticks| (ticks / TICKS_PER_MILLISECOND) as u64),
                text: line.text,
            })
            .collect();
        Self { lines }
    }

    /// True when every line carries a timestamp.
    pub fn is_synced(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|line| line.start_ms.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.text.trim().is_empty())
    }

    pub fn plain_text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A request forwarded to the MediaServer on the client's behalf.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Path relative to the base URL, starting with `/`
    pub path: String,
    /// Query parameters, forwarded in order
    pub query: Vec<(String, String)>,
    pub method: HttpMethod,
}

impl ProxyRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            method: HttpMethod::Get,
        }
    }

    /// `GET /Items/{album_id}` with the caller's query parameters.
    pub fn album(album_id: &str, query: Vec<(String, String)>) -> Self {
        Self {
            path: format!("/Items/{}", urlencoding::encode(album_id)),
            query,
            method: HttpMethod::Get,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Path plus URL-encoded query string.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(key, value)| {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

/// Upstream response mirrored back to the client.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Bytes,
    pub headers: HashMap<String, String>,
}
