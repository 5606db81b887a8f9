use std::sync::Arc;

use indicatif::ProgressBar;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::canonical_track::CanonicalTrack;
use crate::repository::Registry;
use crate::services::LyricsError;
use crate::utils::logging::StructuredLogger;

pub struct FetchedLyrics {
    pub text: String,
    pub synced: bool,
    pub source: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no lyrics found")]
    NotFound,

    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct LrcLibEntry {
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
}

#[derive(Deserialize)]
struct OvhResponse {
    lyrics: Option<String>,
}

/// One entry in the fixed provider chain (§4.7): a synced-lyric source tried
/// first, then one or more plain-text fallbacks. Providers are opaque beyond
/// this contract, so each variant is a thin HTTP call.
#[derive(Clone)]
pub enum LyricsProvider {
    /// lrclib.net — the synced provider tried first.
    LrcLib(reqwest::Client),
    /// lyrics.ovh — a plain-text fallback.
    Ovh(reqwest::Client),
}

impl LyricsProvider {
    fn source_tag(&self) -> &'static str {
        match self {
            LyricsProvider::LrcLib(_) => "lrclib",
            LyricsProvider::Ovh(_) => "lyrics.ovh",
        }
    }

    async fn fetch(&self, title: &str, artist: &str, duration_seconds: u32) -> Result<FetchedLyrics, ProviderError> {
        match self {
            LyricsProvider::LrcLib(client) => fetch_lrclib(client, title, artist, duration_seconds, self.source_tag()).await,
            LyricsProvider::Ovh(client) => fetch_ovh(client, title, artist, self.source_tag()).await,
        }
    }
}

async fn fetch_lrclib(
    client: &reqwest::Client,
    title: &str,
    artist: &str,
    duration_seconds: u32,
    source_tag: &'static str,
) -> Result<FetchedLyrics, ProviderError> {
    let response = client
        .get("https://lrclib.net/api/search")
        .query(&[
            ("track_name", title),
            ("artist_name", artist),
            ("duration", &duration_seconds.to_string()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let entries: Vec<LrcLibEntry> = response.json().await?;
    let entry = entries.into_iter().next().ok_or(ProviderError::NotFound)?;

    if let Some(synced) = entry.synced_lyrics {
        return Ok(FetchedLyrics { text: synced, synced: true, source: source_tag });
    }
    if let Some(plain) = entry.plain_lyrics {
        return Ok(FetchedLyrics { text: plain, synced: false, source: source_tag });
    }

    Err(ProviderError::NotFound)
}

async fn fetch_ovh(
    client: &reqwest::Client,
    title: &str,
    artist: &str,
    source_tag: &'static str,
) -> Result<FetchedLyrics, ProviderError> {
    let mut url = reqwest::Url::parse("https://api.lyrics.ovh/v1/").expect("static url is valid");
    url.path_segments_mut().expect("https url has segments").push(artist).push(title);

    let response = client.get(url).send().await?.error_for_status()?;
    let parsed: OvhResponse = response.json().await?;
    let lyrics = parsed.lyrics.ok_or(ProviderError::NotFound)?;

    Ok(FetchedLyrics { text: lyrics, synced: false, source: source_tag })
}

#[derive(Clone)]
pub struct LyricsResolver {
    registry: Arc<Registry>,
    providers: Vec<LyricsProvider>,
    structured_log: Arc<StructuredLogger>,
    semaphore: Arc<Semaphore>,
}

impl LyricsResolver {
    pub fn new(
        registry: Arc<Registry>,
        providers: Vec<LyricsProvider>,
        structured_log: Arc<StructuredLogger>,
        worker_count: usize,
    ) -> Self {
        Self {
            registry,
            providers,
            structured_log,
            semaphore: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }

    /// Runs phase 4 for every track returned by `Registry::tracks_needing_lyrics`.
    /// Each track is resolved in its own task holding a semaphore permit, so
    /// up to `worker_count` provider chains run concurrently.
    pub async fn run_pending(&self, progress: &ProgressBar) -> Result<usize, LyricsError> {
        let tracks = self.registry.tracks_needing_lyrics().await?;
        progress.set_length(tracks.len() as u64);

        let mut joins = JoinSet::new();
        for track in tracks {
            let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let resolver = self.clone();
            joins.spawn(async move {
                let result = resolver.resolve_one(&track).await;
                drop(permit);
                result
            });
        }

        let mut resolved = 0;
        while let Some(joined) = joins.join_next().await {
            if joined.expect("lyrics task panicked")? {
                resolved += 1;
            }
            progress.inc(1);
        }

        Ok(resolved)
    }

    async fn resolve_one(&self, track: &CanonicalTrack) -> Result<bool, LyricsError> {
        let title = &track.metadata.name;
        let artist = &track.metadata.primary_artist;
        let duration_seconds = track.metadata.duration_seconds();

        for provider in &self.providers {
            match provider.fetch(title, artist, duration_seconds).await {
                Ok(found) => {
                    self.registry
                        .set_lyrics(&track.external_id, &found.text, found.synced, found.source)
                        .await?;
                    return Ok(true);
                }
                Err(err) => {
                    log::debug!("lyrics provider {} failed for '{title}' by '{artist}': {err}", provider.source_tag());
                }
            }
        }

        self.registry.mark_lyrics_not_found(&track.external_id).await?;
        let position = self
            .registry
            .playlist_memberships_for_track(track.id)
            .await
            .ok()
            .and_then(|memberships| memberships.first().map(|(_, position)| *position))
            .unwrap_or(0);
        let catalog_a_url = track.metadata.external_url.as_deref().unwrap_or(&track.external_id);
        self.structured_log.log_lyrics_failure(position, title, artist, "m4a", catalog_a_url);
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_track(registry: &Registry, external_id: &str) -> CanonicalTrack {
        let meta = crate::domain::canonical_track::CanonicalTrackMetadata::new(
            "Song",
            "Artist",
            vec!["Artist".to_string()],
            200_000,
        )
        .unwrap();
        registry.upsert_canonical_track(external_id, &meta).await.unwrap();
        registry.mark_acquired(external_id, "/tmp/t.m4a").await.unwrap();
        registry.track_by_external_id(external_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn no_providers_marks_not_found() {
        let registry = Arc::new(Registry::open("sqlite::memory:").await.expect("registry"));
        let track = setup_track(&registry, "t1").await;

        let structured_log = Arc::new(StructuredLogger::open(&std::env::temp_dir(), "lyrics-test-1").unwrap());
        let resolver = LyricsResolver::new(registry.clone(), Vec::new(), structured_log, 2);

        let found = resolver.resolve_one(&track).await.unwrap();
        assert!(!found);

        let refetched = registry.track_by_external_id("t1").await.unwrap().unwrap();
        assert!(refetched.lyrics_attempted);
        assert!(refetched.lyrics_text.is_none());
    }

    #[test]
    fn source_tag_matches_the_provider_variant() {
        let client = reqwest::Client::new();
        assert_eq!(LyricsProvider::LrcLib(client.clone()).source_tag(), "lrclib");
        assert_eq!(LyricsProvider::Ovh(client).source_tag(), "lyrics.ovh");
    }
}
