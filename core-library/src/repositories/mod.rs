//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations go through the `DatabaseAdapter` bridge
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `TrackRepository` - The local library index used for enrichment
//! - `CacheStore` - Keyed, expiring cache entries, implemented in memory and
//!   by `SqliteLyricsCacheStore` for the `lyrics_cache` table

pub mod cache;
pub mod lyrics;
pub mod track;

pub(crate) mod row;

pub use cache::{CacheEntry, CacheStats, CacheStore, InMemoryCacheStore};
pub use lyrics::SqliteLyricsCacheStore;
pub use track::{SqliteTrackRepository, TrackRepository};
