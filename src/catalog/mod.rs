pub mod null_client;
pub mod spotify;
pub mod youtube_music;

use chrono::NaiveDateTime;

pub use null_client::{NullCatalogAClient, NullCatalogBClient};

/// Either a bare catalog id or the catalog's own external URL; callers may
/// pass whichever they have in hand.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogRef(pub String);

impl From<&str> for CatalogRef {
    fn from(value: &str) -> Self {
        CatalogRef(value.to_string())
    }
}

impl From<String> for CatalogRef {
    fn from(value: String) -> Self {
        CatalogRef(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogAPlaylist {
    pub external_id: String,
    pub external_url: Option<String>,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogATrack {
    pub external_id: String,
    pub name: String,
    pub primary_artist: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub duration_ms: u32,
    pub isrc: Option<String>,
    pub cover_url: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub preview_url: Option<String>,
    pub external_url: Option<String>,
    pub explicit: bool,
    pub popularity: Option<u32>,
    pub is_local: bool,
    pub is_episode: bool,
    /// References the ingestion step resolves via `CatalogAClient::artist`/
    /// `::album` to fill in genres/publisher/copyright (§4.4 step 4).
    pub artist_ref: Option<CatalogRef>,
    pub album_ref: Option<CatalogRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogAPlaylistItem {
    pub track: Option<CatalogATrack>,
    pub added_at: Option<NaiveDateTime>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogAArtist {
    pub genres: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogAAlbum {
    pub publisher: Option<String>,
    pub copyright: Option<String>,
    pub release_date: Option<String>,
    pub year: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogAError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication required for this operation")]
    AuthRequired,

    #[error("catalog A request failed: {0}")]
    Request(String),
}

impl CatalogAError {
    pub fn is_auth_error(&self) -> bool {
        matches!(self, CatalogAError::AuthRequired)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogBError {
    #[error("catalog B search failed: {0}")]
    Request(String),
}

/// §4.3: the core depends on this contract, not a concrete SDK. Implemented
/// with native async-fn-in-trait (no dyn dispatch); callers are generic over
/// `C: CatalogAClient`.
pub trait CatalogAClient {
    async fn playlist(&self, reference: &CatalogRef) -> Result<CatalogAPlaylist, CatalogAError>;

    /// Auto-paginating: callers receive the fully assembled item list.
    async fn all_playlist_items(
        &self,
        reference: &CatalogRef,
    ) -> Result<Vec<CatalogAPlaylistItem>, CatalogAError>;

    /// Requires user-delegated auth; implementations return
    /// [`CatalogAError::AuthRequired`] under application-credentials mode.
    async fn all_saved_items(&self) -> Result<Vec<CatalogAPlaylistItem>, CatalogAError>;

    async fn track(&self, reference: &CatalogRef) -> Result<CatalogATrack, CatalogAError>;

    async fn artist(&self, reference: &CatalogRef) -> Result<CatalogAArtist, CatalogAError>;

    async fn album(&self, reference: &CatalogRef) -> Result<CatalogAAlbum, CatalogAError>;
}

/// §4.5: an opaque search client over the target catalog.
pub trait CatalogBClient {
    async fn search_by_isrc(
        &self,
        isrc: &str,
    ) -> Result<Vec<crate::domain::match_result::CatalogBResult>, CatalogBError>;

    async fn search_by_query(
        &self,
        query: &str,
    ) -> Result<Vec<crate::domain::match_result::CatalogBResult>, CatalogBError>;
}
