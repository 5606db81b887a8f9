use chrono::NaiveDateTime;

use super::ValidationError;

/// Relation row for `playlist_tracks`: (playlist, canonical track, position, added-at).
///
/// Invariant I5: removing a link never removes the `CanonicalTrack` it points at.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaylistTrackLink {
    pub playlist_id: i64,
    pub track_id: i64,
    pub position: u32,
    pub added_at: Option<NaiveDateTime>,
}

impl PlaylistTrackLink {
    pub fn new(
        playlist_id: i64,
        track_id: i64,
        position: u32,
        added_at: Option<NaiveDateTime>,
    ) -> Result<Self, ValidationError> {
        if position == 0 {
            return Err(ValidationError::PositionIsZero(position));
        }

        Ok(Self {
            playlist_id,
            track_id,
            position,
            added_at,
        })
    }
}
