//! # Library Management Module
//!
//! Owns the SQLite database and the repositories built on it.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pool, pragmas and embedded migrations
//! - The local library index (`tracks`) consulted when enriching
//!   third-party recommendations
//! - The content-addressed lyrics cache (`lyrics_cache`) behind the generic
//!   [`CacheStore`](repositories::CacheStore) trait

pub mod adapters;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{
    normalize_text, LibraryTrack, LyricsCacheEntry, LyricsCacheKey, LyricsSource, SyncedLine,
};
