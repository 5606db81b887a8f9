use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::match_result::CatalogBResult;

use super::{
    CatalogAAlbum, CatalogAArtist, CatalogAClient, CatalogAError, CatalogAPlaylist,
    CatalogAPlaylistItem, CatalogATrack, CatalogBClient, CatalogBError, CatalogRef,
};

/// In-memory `CatalogAClient` double. Fixtures are registered up front; any
/// lookup for a reference that wasn't registered returns `NotFound`.
#[derive(Default)]
pub struct NullCatalogAClient {
    playlists: HashMap<String, CatalogAPlaylist>,
    playlist_items: HashMap<String, Vec<CatalogAPlaylistItem>>,
    saved_items: Option<Vec<CatalogAPlaylistItem>>,
    tracks: HashMap<String, CatalogATrack>,
    artists: HashMap<String, CatalogAArtist>,
    albums: HashMap<String, CatalogAAlbum>,
}

impl NullCatalogAClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_playlist(mut self, reference: &str, playlist: CatalogAPlaylist) -> Self {
        self.playlists.insert(reference.to_string(), playlist);
        self
    }

    pub fn with_playlist_items(mut self, reference: &str, items: Vec<CatalogAPlaylistItem>) -> Self {
        self.playlist_items.insert(reference.to_string(), items);
        self
    }

    pub fn with_saved_items(mut self, items: Vec<CatalogAPlaylistItem>) -> Self {
        self.saved_items = Some(items);
        self
    }

    pub fn with_track(mut self, reference: &str, track: CatalogATrack) -> Self {
        self.tracks.insert(reference.to_string(), track);
        self
    }

    pub fn with_artist(mut self, reference: &str, artist: CatalogAArtist) -> Self {
        self.artists.insert(reference.to_string(), artist);
        self
    }

    pub fn with_album(mut self, reference: &str, album: CatalogAAlbum) -> Self {
        self.albums.insert(reference.to_string(), album);
        self
    }
}

impl CatalogAClient for NullCatalogAClient {
    async fn playlist(&self, reference: &CatalogRef) -> Result<CatalogAPlaylist, CatalogAError> {
        self.playlists
            .get(&reference.0)
            .cloned()
            .ok_or_else(|| CatalogAError::NotFound(reference.0.clone()))
    }

    async fn all_playlist_items(
        &self,
        reference: &CatalogRef,
    ) -> Result<Vec<CatalogAPlaylistItem>, CatalogAError> {
        self.playlist_items
            .get(&reference.0)
            .cloned()
            .ok_or_else(|| CatalogAError::NotFound(reference.0.clone()))
    }

    async fn all_saved_items(&self) -> Result<Vec<CatalogAPlaylistItem>, CatalogAError> {
        self.saved_items.clone().ok_or(CatalogAError::AuthRequired)
    }

    async fn track(&self, reference: &CatalogRef) -> Result<CatalogATrack, CatalogAError> {
        self.tracks
            .get(&reference.0)
            .cloned()
            .ok_or_else(|| CatalogAError::NotFound(reference.0.clone()))
    }

    async fn artist(&self, reference: &CatalogRef) -> Result<CatalogAArtist, CatalogAError> {
        Ok(self.artists.get(&reference.0).cloned().unwrap_or_default())
    }

    async fn album(&self, reference: &CatalogRef) -> Result<CatalogAAlbum, CatalogAError> {
        Ok(self.albums.get(&reference.0).cloned().unwrap_or_default())
    }
}

/// In-memory `CatalogBClient` double. Responses are keyed by exact query
/// string; `search_by_isrc` and `search_by_query` share the same map so tests
/// can register a result under an ISRC key or a free-text query key.
#[derive(Default)]
pub struct NullCatalogBClient {
    responses: Mutex<HashMap<String, Vec<CatalogBResult>>>,
}

impl NullCatalogBClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, key: &str, results: Vec<CatalogBResult>) -> Self {
        self.responses.lock().unwrap().insert(key.to_string(), results);
        self
    }
}

impl CatalogBClient for NullCatalogBClient {
    async fn search_by_isrc(&self, isrc: &str) -> Result<Vec<CatalogBResult>, CatalogBError> {
        Ok(self.responses.lock().unwrap().get(isrc).cloned().unwrap_or_default())
    }

    async fn search_by_query(&self, query: &str) -> Result<Vec<CatalogBResult>, CatalogBError> {
        Ok(self.responses.lock().unwrap().get(query).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_playlist_ref_is_not_found() {
        let client = NullCatalogAClient::new();
        let err = client.playlist(&CatalogRef::from("missing")).await.unwrap_err();
        assert!(matches!(err, CatalogAError::NotFound(_)));
    }

    #[tokio::test]
    async fn saved_items_require_auth_by_default() {
        let client = NullCatalogAClient::new();
        let err = client.all_saved_items().await.unwrap_err();
        assert!(err.is_auth_error());
    }

    #[tokio::test]
    async fn catalog_b_double_returns_registered_results() {
        let result = CatalogBResult {
            id: "v1".to_string(),
            url: "https://example/v1".to_string(),
            title: "Title".to_string(),
            primary_author: "Artist".to_string(),
            artists: vec!["Artist".to_string()],
            duration_seconds: 200,
            verified: true,
            album: None,
            explicit: None,
            views: Some(1_000),
        };
        let client = NullCatalogBClient::new().with_response("ISRC123", vec![result.clone()]);

        let results = client.search_by_isrc("ISRC123").await.expect("search");
        assert_eq!(results, vec![result]);

        let empty = client.search_by_query("no such query").await.expect("search");
        assert!(empty.is_empty());
    }
}
