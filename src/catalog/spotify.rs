use serde::Deserialize;
use tokio::sync::RwLock;

use super::{
    CatalogAAlbum, CatalogAArtist, CatalogAClient, CatalogAError, CatalogAPlaylist,
    CatalogAPlaylistItem, CatalogATrack, CatalogRef,
};

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const PLAYLIST_PAGE_SIZE: u32 = 100;
const SAVED_PAGE_SIZE: u32 = 50;

/// Application-credentials mode sees only public playlists; user-delegated
/// mode additionally carries a refresh token and can reach `AllSavedItems`
/// (§4.3).
enum AuthMode {
    ClientCredentials,
    UserDelegated { refresh_token: String },
}

struct CachedToken {
    access_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// `CatalogAClient` over the Spotify Web API. One process-wide instance is
/// expected (§4.3 double-init guard lives at the construction site in
/// main.rs, not here, since the trait itself carries no global state).
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_mode: AuthMode,
    token: RwLock<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_mode: AuthMode::ClientCredentials,
            token: RwLock::new(None),
        }
    }

    pub fn with_user_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.auth_mode = AuthMode::UserDelegated { refresh_token: refresh_token.into() };
        self
    }

    async fn access_token(&self) -> Result<String, CatalogAError> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.expires_at > chrono::Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let form: Vec<(&str, &str)> = match &self.auth_mode {
            AuthMode::ClientCredentials => vec![("grant_type", "client_credentials")],
            AuthMode::UserDelegated { refresh_token } => {
                vec![("grant_type", "refresh_token"), ("refresh_token", refresh_token)]
            }
        };

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|err| CatalogAError::Request(err.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CatalogAError::AuthRequired);
        }

        let token: TokenResponse = response
            .error_for_status()
            .map_err(|err| CatalogAError::Request(err.to_string()))?
            .json()
            .await
            .map_err(|err| CatalogAError::Request(err.to_string()))?;

        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(token.expires_in - 30);
        *self.token.write().await = Some(CachedToken { access_token: token.access_token.clone(), expires_at });

        Ok(token.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, CatalogAError> {
        let token = self.access_token().await?;
        let url = if path.starts_with("http") { path.to_string() } else { format!("{API_BASE}{path}") };

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| CatalogAError::Request(err.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CatalogAError::AuthRequired);
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogAError::NotFound(path.to_string()));
        }

        response
            .error_for_status()
            .map_err(|err| CatalogAError::Request(err.to_string()))?
            .json()
            .await
            .map_err(|err| CatalogAError::Request(err.to_string()))
    }
}

/// Strips a full `https://open.spotify.com/playlist/<id>` URL down to the
/// bare id Spotify's REST paths expect; bare ids pass through unchanged.
fn bare_id(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference).split('?').next().unwrap_or(reference)
}

#[derive(Deserialize)]
struct RawImage {
    url: String,
}

#[derive(Deserialize)]
struct RawArtistRef {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct RawAlbumRef {
    id: String,
    name: String,
    images: Vec<RawImage>,
}

#[derive(Deserialize)]
struct RawExternalIds {
    isrc: Option<String>,
}

#[derive(Deserialize)]
struct RawTrack {
    id: String,
    name: String,
    artists: Vec<RawArtistRef>,
    album: Option<RawAlbumRef>,
    duration_ms: u32,
    external_ids: Option<RawExternalIds>,
    external_urls: RawExternalUrls,
    track_number: Option<u32>,
    disc_number: Option<u32>,
    explicit: bool,
    popularity: Option<u32>,
    preview_url: Option<String>,
    is_local: bool,
}

#[derive(Deserialize)]
struct RawExternalUrls {
    spotify: Option<String>,
}

#[derive(Deserialize)]
struct RawPlaylistItem {
    added_at: Option<String>,
    track: Option<RawPlaylistItemTrack>,
}

/// `type` discriminates "track" from "episode"; episodes carry the same `id`
/// field but none of the track-only fields, so those stay optional here and
/// get filled with defaults when building the episode placeholder.
#[derive(Deserialize)]
struct RawPlaylistItemTrack {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: RawTrackFields,
}

#[derive(Deserialize)]
struct RawTrackFields {
    id: String,
    name: Option<String>,
    artists: Option<Vec<RawArtistRef>>,
    album: Option<RawAlbumRef>,
    duration_ms: Option<u32>,
    external_ids: Option<RawExternalIds>,
    external_urls: Option<RawExternalUrls>,
    track_number: Option<u32>,
    disc_number: Option<u32>,
    explicit: Option<bool>,
    popularity: Option<u32>,
    preview_url: Option<String>,
    is_local: Option<bool>,
}

#[derive(Deserialize)]
struct RawPlaylistItemsPage {
    items: Vec<RawPlaylistItem>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct RawSavedTrack {
    added_at: Option<String>,
    track: RawTrack,
}

#[derive(Deserialize)]
struct RawSavedTracksPage {
    items: Vec<RawSavedTrack>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct RawPlaylist {
    id: String,
    name: String,
    external_urls: RawExternalUrls,
}

#[derive(Deserialize)]
struct RawArtist {
    genres: Vec<String>,
}

#[derive(Deserialize)]
struct RawAlbum {
    label: Option<String>,
    copyrights: Vec<RawCopyright>,
    release_date: Option<String>,
}

#[derive(Deserialize)]
struct RawCopyright {
    text: String,
}

/// Release date lives on `CatalogAAlbum`, fetched separately via
/// `CatalogAClient::album`, so it is intentionally not duplicated here.
fn track_from_raw(raw: RawTrack) -> CatalogATrack {
    let artists: Vec<String> = raw.artists.iter().map(|a| a.name.clone()).collect();
    let primary_artist = artists.first().cloned().unwrap_or_default();
    let artist_ref = raw.artists.first().map(|a| CatalogRef(a.id.clone()));
    let (album, album_ref, cover_url) = match raw.album {
        Some(album) => {
            (Some(album.name), Some(CatalogRef(album.id)), album.images.first().map(|i| i.url.clone()))
        }
        None => (None, None, None),
    };

    CatalogATrack {
        external_id: raw.id,
        name: raw.name,
        primary_artist,
        artists,
        album,
        album_artist: None,
        duration_ms: raw.duration_ms,
        isrc: raw.external_ids.and_then(|e| e.isrc),
        cover_url,
        track_number: raw.track_number,
        disc_number: raw.disc_number,
        preview_url: raw.preview_url,
        external_url: raw.external_urls.spotify,
        explicit: raw.explicit,
        popularity: raw.popularity,
        is_local: raw.is_local,
        is_episode: false,
        artist_ref,
        album_ref,
    }
}

fn track_from_playlist_item(item: RawPlaylistItemTrack) -> CatalogATrack {
    if item.kind == "episode" {
        return CatalogATrack {
            external_id: item.fields.id,
            name: String::new(),
            primary_artist: String::new(),
            artists: Vec::new(),
            album: None,
            album_artist: None,
            duration_ms: 0,
            isrc: None,
            cover_url: None,
            track_number: None,
            disc_number: None,
            preview_url: None,
            external_url: None,
            explicit: false,
            popularity: None,
            is_local: false,
            is_episode: true,
            artist_ref: None,
            album_ref: None,
        };
    }

    let fields = item.fields;
    let is_local = fields.is_local.unwrap_or(false);
    let raw_artists = fields.artists.unwrap_or_default();
    let artists: Vec<String> = raw_artists.iter().map(|a| a.name.clone()).collect();
    let primary_artist = artists.first().cloned().unwrap_or_default();
    let artist_ref = raw_artists.first().map(|a| CatalogRef(a.id.clone()));
    let (album, album_ref, cover_url) = match fields.album {
        Some(album) => {
            (Some(album.name), Some(CatalogRef(album.id)), album.images.first().map(|i| i.url.clone()))
        }
        None => (None, None, None),
    };

    CatalogATrack {
        external_id: fields.id,
        name: fields.name.unwrap_or_default(),
        primary_artist,
        artists,
        album,
        album_artist: None,
        duration_ms: fields.duration_ms.unwrap_or(0),
        isrc: fields.external_ids.and_then(|e| e.isrc),
        cover_url,
        track_number: fields.track_number,
        disc_number: fields.disc_number,
        preview_url: fields.preview_url,
        external_url: fields.external_urls.and_then(|u| u.spotify),
        explicit: fields.explicit.unwrap_or(false),
        popularity: fields.popularity,
        is_local,
        is_episode: false,
        artist_ref,
        album_ref,
    }
}

impl CatalogAClient for SpotifyClient {
    async fn playlist(&self, reference: &CatalogRef) -> Result<CatalogAPlaylist, CatalogAError> {
        let id = bare_id(&reference.0);
        let raw: RawPlaylist = self
            .get_json(&format!("/playlists/{id}?fields=id,name,external_urls"))
            .await?;

        Ok(CatalogAPlaylist { external_id: raw.id, external_url: raw.external_urls.spotify, name: raw.name })
    }

    async fn all_playlist_items(
        &self,
        reference: &CatalogRef,
    ) -> Result<Vec<CatalogAPlaylistItem>, CatalogAError> {
        let id = bare_id(&reference.0);
        let mut items = Vec::new();
        let mut next = Some(format!(
            "/playlists/{id}/tracks?limit={PLAYLIST_PAGE_SIZE}&additional_types=track,episode"
        ));

        while let Some(path) = next {
            let page: RawPlaylistItemsPage = self.get_json(&path).await?;
            for raw_item in page.items {
                let added_at = raw_item
                    .added_at
                    .as_deref()
                    .and_then(|s| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ").ok());

                let track = raw_item.track.map(track_from_playlist_item);

                items.push(CatalogAPlaylistItem { track, added_at });
            }
            next = page.next;
        }

        Ok(items)
    }

    async fn all_saved_items(&self) -> Result<Vec<CatalogAPlaylistItem>, CatalogAError> {
        if !matches!(self.auth_mode, AuthMode::UserDelegated { .. }) {
            return Err(CatalogAError::AuthRequired);
        }

        let mut items = Vec::new();
        let mut next = Some(format!("/me/tracks?limit={SAVED_PAGE_SIZE}"));

        while let Some(path) = next {
            let page: RawSavedTracksPage = self.get_json(&path).await?;
            for raw_item in page.items {
                let added_at = raw_item
                    .added_at
                    .as_deref()
                    .and_then(|s| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ").ok());
                items.push(CatalogAPlaylistItem { track: Some(track_from_raw(raw_item.track)), added_at });
            }
            next = page.next;
        }

        Ok(items)
    }

    async fn track(&self, reference: &CatalogRef) -> Result<CatalogATrack, CatalogAError> {
        let id = bare_id(&reference.0);
        let raw: RawTrack = self.get_json(&format!("/tracks/{id}")).await?;
        Ok(track_from_raw(raw))
    }

    async fn artist(&self, reference: &CatalogRef) -> Result<CatalogAArtist, CatalogAError> {
        let id = bare_id(&reference.0);
        let raw: RawArtist = self.get_json(&format!("/artists/{id}")).await?;
        Ok(CatalogAArtist { genres: raw.genres })
    }

    async fn album(&self, reference: &CatalogRef) -> Result<CatalogAAlbum, CatalogAError> {
        let id = bare_id(&reference.0);
        let raw: RawAlbum = self.get_json(&format!("/albums/{id}")).await?;
        let year = raw.release_date.as_deref().and_then(|d| d.get(0..4)).and_then(|y| y.parse().ok());

        Ok(CatalogAAlbum {
            publisher: raw.label,
            copyright: raw.copyrights.into_iter().next().map(|c| c.text),
            release_date: raw.release_date,
            year,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_id_strips_full_urls() {
        assert_eq!(bare_id("https://open.spotify.com/playlist/37i9dQZF1?si=abc"), "37i9dQZF1");
        assert_eq!(bare_id("37i9dQZF1"), "37i9dQZF1");
    }
}
