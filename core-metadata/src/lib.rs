//! # Metadata Aggregation
//!
//! Aggregates external metadata for the client and caches what is expensive
//! to fetch.
//!
//! ## Overview
//!
//! This module handles:
//! - Similar and top tracks from TrackGraph (Last.fm-compatible API)
//! - Enrichment of those candidates against the local library index
//! - Lyrics lookups with a persistent 30-day cache, negative caching, and
//!   provider fallback (MediaServer embedded lyrics, then the lyrics API)

pub mod enrichment;
pub mod error;
pub mod lrc;
pub mod lyrics;
pub mod providers;

pub use enrichment::{Candidate, EnrichedTrack, LibraryEnrichment};
pub use error::{MetadataError, Result};
pub use lyrics::{LyricsCacheService, LyricsProvider, LyricsQuery, ProviderLyrics, RetryConfig};
pub use providers::{SimilarTrack, TopTrack, TrackGraphClient};
