use chrono::NaiveDateTime;

use super::{ValidationError, LIKED_PLAYLIST_ID};

#[derive(Clone, Debug, PartialEq)]
pub struct Playlist {
    id: i64,
    external_id: String,
    external_url: Option<String>,
    name: String,
    last_synced: Option<NaiveDateTime>,
}

impl Playlist {
    pub fn new(
        id: i64,
        external_id: impl Into<String>,
        external_url: Option<String>,
        name: impl Into<String>,
        last_synced: Option<NaiveDateTime>,
    ) -> Result<Self, ValidationError> {
        let external_id = external_id.into();
        let name = name.into();

        if external_id.trim().is_empty() {
            return Err(ValidationError::ExternalIdIsEmptyString);
        }
        if name.trim().is_empty() {
            return Err(ValidationError::NameIsEmptyString);
        }

        Ok(Self {
            id,
            external_id,
            external_url,
            name,
            last_synced,
        })
    }

    pub fn is_liked_sentinel(&self) -> bool {
        self.external_id == LIKED_PLAYLIST_ID
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn external_url(&self) -> Option<&str> {
        self.external_url.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_synced(&self) -> Option<NaiveDateTime> {
        self.last_synced
    }
}
