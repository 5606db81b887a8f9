pub mod canonical_track;
pub mod playlist;
pub mod playlist_track_link;
pub mod match_result;

/// Reserved catalog-B URL sentinel: a completed-but-unsuccessful resolution attempt.
pub const MATCH_FAILED_SENTINEL: &str = "MATCH_FAILED";

/// Reserved external playlist id for the user's saved-items pseudo-playlist.
pub const LIKED_PLAYLIST_ID: &str = "LIKED";

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("External id cannot be an empty string.")]
    ExternalIdIsEmptyString,

    #[error("Name field cannot be an empty string.")]
    NameIsEmptyString,

    #[error("Primary artist cannot be an empty string.")]
    PrimaryArtistIsEmptyString,

    #[error("Duration cannot be zero.")]
    DurationIsZero,

    #[error("Position must be at least 1, got {0}.")]
    PositionIsZero(u32),
}
