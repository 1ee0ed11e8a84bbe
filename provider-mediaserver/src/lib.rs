//! # MediaServer Provider
//!
//! Authorized access to a Jellyfin-compatible MediaServer.
//!
//! ## Overview
//!
//! This module provides:
//! - A pass-through proxy for the client's album lookups
//! - Token handling via the shared [`core_auth::MediaServerSession`], with one
//!   re-login on `401`
//! - Audio item search and embedded lyrics retrieval

pub mod client;
pub mod error;
pub mod types;

pub use client::MediaServerClient;
pub use error::{MediaServerError, Result};
pub use types::{LyricLine, MediaItem, MediaServerLyrics, ProxyRequest, ProxyResponse};
