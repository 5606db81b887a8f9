use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{ValidationError, MATCH_FAILED_SENTINEL};

/// Everything the Registry knows about a track that originates from catalog A.
///
/// Distinct from the resolution/acquisition/enrichment/finalization state that
/// lives alongside it in `canonical_tracks` (Invariant I1: re-upserting this
/// block must never touch that state).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CanonicalTrackMetadata {
    pub name: String,
    pub primary_artist: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub duration_ms: u32,
    pub isrc: Option<String>,
    pub cover_url: Option<String>,
    pub release_date: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<u32>,
    pub genres: Vec<String>,
    pub publisher: Option<String>,
    pub copyright: Option<String>,
    pub explicit: bool,
    pub popularity: Option<u32>,
    pub preview_url: Option<String>,
    pub external_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl CanonicalTrackMetadata {
    pub fn new(
        name: impl Into<String>,
        primary_artist: impl Into<String>,
        artists: Vec<String>,
        duration_ms: u32,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let primary_artist = primary_artist.into();

        if name.trim().is_empty() {
            return Err(ValidationError::NameIsEmptyString);
        }
        if primary_artist.trim().is_empty() {
            return Err(ValidationError::PrimaryArtistIsEmptyString);
        }
        if duration_ms == 0 {
            return Err(ValidationError::DurationIsZero);
        }

        Ok(Self {
            name,
            primary_artist,
            artists,
            album: None,
            album_artist: None,
            duration_ms,
            isrc: None,
            cover_url: None,
            release_date: None,
            track_number: None,
            disc_number: None,
            year: None,
            genres: Vec::new(),
            publisher: None,
            copyright: None,
            explicit: false,
            popularity: None,
            preview_url: None,
            external_url: None,
            metadata: None,
        })
    }

    pub fn duration_seconds(&self) -> u32 {
        self.duration_ms / 1000
    }
}

/// Resolution state: the catalog-B side of a track's identity.
///
/// `Resolved`/`Failed`/`Unresolved` map 1:1 onto the `catalog_b_url` column,
/// where `Failed` is stored as the literal [`MATCH_FAILED_SENTINEL`] string
/// rather than a separate boolean column (see the matching Open Question
/// decision in DESIGN.md).
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Unresolved,
    Failed,
    Resolved { url: String, score: f64 },
}

impl Resolution {
    pub fn from_columns(catalog_b_url: Option<String>, match_score: Option<f64>) -> Self {
        match catalog_b_url {
            None => Resolution::Unresolved,
            Some(ref url) if url == MATCH_FAILED_SENTINEL => Resolution::Failed,
            Some(url) => Resolution::Resolved {
                url,
                score: match_score.unwrap_or(0.0),
            },
        }
    }

    pub fn url_column(&self) -> Option<&str> {
        match self {
            Resolution::Unresolved => None,
            Resolution::Failed => Some(MATCH_FAILED_SENTINEL),
            Resolution::Resolved { url, .. } => Some(url),
        }
    }

    pub fn score_column(&self) -> Option<f64> {
        match self {
            Resolution::Unresolved => None,
            Resolution::Failed => Some(0.0),
            Resolution::Resolved { score, .. } => Some(*score),
        }
    }

    pub fn is_eligible_for_acquisition(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }
}

/// A fully hydrated row of `canonical_tracks`.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalTrack {
    pub id: i64,
    pub external_id: String,
    pub metadata: CanonicalTrackMetadata,

    pub resolution: Resolution,
    pub match_at: Option<NaiveDateTime>,

    pub acquired: bool,
    pub acquired_at: Option<NaiveDateTime>,
    pub file_path: Option<PathBuf>,

    pub lyrics_attempted: bool,
    pub lyrics_text: Option<String>,
    pub lyrics_synced: bool,
    pub lyrics_source: Option<String>,

    pub metadata_embedded: bool,
    pub lyrics_embedded: bool,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl CanonicalTrack {
    /// Invariant I2.
    pub fn eligible_for_acquisition(&self) -> bool {
        self.resolution.is_eligible_for_acquisition() && !self.acquired
    }

    /// Invariant I3.
    pub fn eligible_for_enrichment(&self) -> bool {
        self.acquired && !self.lyrics_attempted
    }

    /// Invariant I4.
    pub fn eligible_for_finalization(&self) -> bool {
        if !self.acquired {
            return false;
        }

        let needs_metadata = !self.metadata_embedded;
        let needs_lyrics =
            self.lyrics_attempted && self.lyrics_text.is_some() && !self.lyrics_embedded;

        needs_metadata || needs_lyrics
    }
}
