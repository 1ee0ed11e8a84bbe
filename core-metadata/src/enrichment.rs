//! # Library Enrichment
//!
//! Marks TrackGraph candidates that already exist in the local library.
//!
//! ## Overview
//!
//! Candidates are matched by normalized artist and title against the library
//! index. All distinct artists of a batch are resolved with one repository
//! query; the records come back ordered by `created_at, id`, and the first
//! record per normalized pair wins.
//!
//! Enrichment never fails a request. When the library cannot be read every
//! candidate is returned with `in_library = false`.
//!
//! ```ignore
//! let enrichment = LibraryEnrichment::new(Arc::new(track_repository));
//! let tracks = enrichment.enrich(similar_tracks).await;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use core_library::repositories::TrackRepository;
use core_library::normalize_text;
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// A track suggestion that can be looked up in the library.
pub trait Candidate {
    fn artist(&self) -> &str;
    fn title(&self) -> &str;
}

/// A candidate annotated with its library presence.
///
/// Serializes flat: the candidate's own fields followed by `inLibrary` and
/// `libraryTrackId`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedTrack<T> {
    #[serde(flatten)]
    pub track: T,
    pub in_library: bool,
    pub library_track_id: Option<String>,
}

impl<T> EnrichedTrack<T> {
    fn unmatched(track: T) -> Self {
        Self {
            track,
            in_library: false,
            library_track_id: None,
        }
    }
}

/// Joins candidates against the local library index.
#[derive(Clone)]
pub struct LibraryEnrichment {
    track_repository: Arc<dyn TrackRepository>,
}

impl LibraryEnrichment {
    pub fn new(track_repository: Arc<dyn TrackRepository>) -> Self {
        Self { track_repository }
    }

    /// Annotates every candidate, preserving order.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn enrich<T: Candidate>(&self, candidates: Vec<T>) -> Vec<EnrichedTrack<T>> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let artists: Vec<String> = candidates
            .iter()
            .map(|candidate| normalize_text(candidate.artist()))
            .filter(|artist| !artist.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let library = match self.track_repository.find_by_artists(&artists).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(error = %e, "Library lookup failed, returning candidates unenriched");
                return candidates.into_iter().map(EnrichedTrack::unmatched).collect();
            }
        };

        // (normalized artist, normalized title) -> first library id
        let mut index: HashMap<(String, String), String> = HashMap::new();
        for track in library {
            index
                .entry((track.normalized_artist, track.normalized_title))
                .or_insert(track.id);
        }

        let enriched: Vec<EnrichedTrack<T>> = candidates
            .into_iter()
            .map(|candidate| {
                let key = (
                    normalize_text(candidate.artist()),
                    normalize_text(candidate.title()),
                );
                match index.get(&key) {
                    Some(id) => EnrichedTrack {
                        library_track_id: Some(id.clone()),
                        in_library: true,
                        track: candidate,
                    },
                    None => EnrichedTrack::unmatched(candidate),
                }
            })
            .collect();

        debug!(
            matched = enriched.iter().filter(|track| track.in_library).count(),
            "Enriched candidates"
        );
        enriched
    }
}
