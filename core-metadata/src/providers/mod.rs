//! External Metadata Providers
//!
//! - TrackGraph (Last.fm-compatible) similar and top tracks
//!
//! Each provider applies a client-side rate limit to comply with the API's
//! terms of service.

pub mod trackgraph;

pub use trackgraph::{
    parse_limit, SimilarTrack, TopTrack, TrackGraphClient, DEFAULT_SIMILAR_LIMIT,
    DEFAULT_TOP_LIMIT, MAX_LIMIT,
};
