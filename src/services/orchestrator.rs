use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::{CatalogAClient, CatalogBClient, CatalogRef};
use crate::domain::canonical_track::CanonicalTrackMetadata;
use crate::domain::LIKED_PLAYLIST_ID;
use crate::repository::{Registry, RegistryStats};
use crate::services::acquirer::{Acquirer, Extractor};
use crate::services::embedder::Embedder;
use crate::services::lyrics::LyricsResolver;
use crate::services::{matcher, OrchestratorError};
use crate::utils::logging::StructuredLogger;

/// What phase 1 should ingest: a single playlist, the LIKED pseudo-playlist,
/// or every known playlist (§4.4 sync-all mode).
#[derive(Clone, Debug, PartialEq)]
pub enum Scope {
    Playlist(CatalogRef),
    Liked,
    SyncAll,
}

/// Which phases to run on this invocation, in pipeline order. Independent of
/// `Scope`: phases 2-5 consume Registry-eligibility queries directly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhaseSelection {
    pub ingest: bool,
    pub matching: bool,
    pub acquisition: bool,
    pub lyrics: bool,
    pub embedding: bool,
    pub force_rematch: bool,
}

impl PhaseSelection {
    pub fn all() -> Self {
        Self { ingest: true, matching: true, acquisition: true, lyrics: true, embedding: true, force_rematch: false }
    }
}

/// Final summary banner contents (§7 "a single summary banner at end").
#[derive(Debug, Default, PartialEq)]
pub struct RunSummary {
    pub tracks_ingested: usize,
    pub tracks_matched: usize,
    pub tracks_match_failed: usize,
    pub tracks_acquired: usize,
    pub tracks_with_lyrics: usize,
    pub registry_stats: RegistryStats,
}

/// Cooperative cancellation: checked between tracks, never mid-track, per §5.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator<A, B, E> {
    registry: Arc<Registry>,
    catalog_a: A,
    catalog_b: Arc<B>,
    acquirer: Acquirer<E>,
    lyrics: LyricsResolver,
    embedder: Embedder,
    structured_log: Arc<StructuredLogger>,
    cancel: CancelFlag,
}

impl<A, B, E> Orchestrator<A, B, E>
where
    A: CatalogAClient,
    B: CatalogBClient,
    E: Extractor + Sync + Send + 'static,
{
    pub fn new(
        registry: Arc<Registry>,
        catalog_a: A,
        catalog_b: Arc<B>,
        acquirer: Acquirer<E>,
        lyrics: LyricsResolver,
        embedder: Embedder,
        structured_log: Arc<StructuredLogger>,
        cancel: CancelFlag,
    ) -> Self {
        Self { registry, catalog_a, catalog_b, acquirer, lyrics, embedder, structured_log, cancel }
    }

    /// Dispatches the selected phases in pipeline order, per §4.9. Each
    /// phase's input is re-queried from the Registry after the previous
    /// phase completes, so a cancelled or interrupted run resumes correctly.
    pub async fn run(&self, scope: Option<Scope>, phases: &PhaseSelection) -> Result<RunSummary, OrchestratorError> {
        let mut summary = RunSummary::default();

        if phases.ingest {
            let scope = scope.ok_or(OrchestratorError::MissingScope)?;
            summary.tracks_ingested = self.run_ingestion(&scope).await?;
        }

        if self.cancel.is_cancelled() {
            return Ok(self.finish(summary).await?);
        }

        if phases.matching {
            if phases.force_rematch {
                self.registry.reset_failed_matches(None).await?;
            }
            let progress = Self::phase_progress("matching");
            let (matched, failed) = self.run_matching(&progress).await?;
            progress.finish_and_clear();
            summary.tracks_matched = matched;
            summary.tracks_match_failed = failed;
        }

        if self.cancel.is_cancelled() {
            return Ok(self.finish(summary).await?);
        }

        if phases.acquisition {
            let progress = Self::phase_progress("acquiring");
            let outcomes = self.acquirer.run_pending(&progress).await?;
            progress.finish_and_clear();
            summary.tracks_acquired = outcomes.len();
        }

        if self.cancel.is_cancelled() {
            return Ok(self.finish(summary).await?);
        }

        if phases.lyrics {
            let progress = Self::phase_progress("lyrics");
            summary.tracks_with_lyrics = self.lyrics.run_pending(&progress).await?;
            progress.finish_and_clear();
        }

        if self.cancel.is_cancelled() {
            return Ok(self.finish(summary).await?);
        }

        if phases.embedding {
            let progress = Self::phase_progress("embedding");
            self.embedder.run_pending(&progress).await?;
            progress.finish_and_clear();
        }

        self.finish(summary).await
    }

    /// One bar per phase (§4.9/§5: "progress reporter: single instance per
    /// phase, updated atomically by workers"). Length is set by the runner
    /// once it knows how many tracks it's processing.
    fn phase_progress(label: &'static str) -> ProgressBar {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{prefix:>10} [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("static template is valid")
            .progress_chars("##-");
        bar.set_style(style);
        bar.set_prefix(label);
        bar
    }

    async fn finish(&self, mut summary: RunSummary) -> Result<RunSummary, OrchestratorError> {
        summary.registry_stats = self.registry.stats().await?;
        Ok(summary)
    }

    /// §4.4: ingest one scope. Sync-all iterates every eligible playlist
    /// sequentially (HTTP rate-friendly) and continues past per-playlist
    /// errors.
    async fn run_ingestion(&self, scope: &Scope) -> Result<usize, OrchestratorError> {
        match scope {
            Scope::Playlist(reference) => self.ingest_playlist(reference).await,
            Scope::Liked => self.ingest_liked().await,
            Scope::SyncAll => {
                let mut total = 0;
                for playlist in self.registry.all_playlists().await? {
                    if playlist.external_id() == LIKED_PLAYLIST_ID {
                        match self.ingest_liked().await {
                            Ok(n) => total += n,
                            Err(err) => log::warn!("sync-all: LIKED ingestion failed: {err}"),
                        }
                        continue;
                    }

                    let Some(url) = playlist.external_url() else { continue };
                    match self.ingest_playlist(&CatalogRef::from(url)).await {
                        Ok(n) => total += n,
                        Err(err) => log::warn!("sync-all: playlist '{}' ingestion failed: {err}", playlist.name()),
                    }
                }
                Ok(total)
            }
        }
    }

    async fn ingest_playlist(&self, reference: &CatalogRef) -> Result<usize, OrchestratorError> {
        let playlist = self.catalog_a.playlist(reference).await?;
        let playlist_id = self
            .registry
            .upsert_playlist(&playlist.external_id, playlist.external_url.as_deref(), &playlist.name)
            .await?;

        let items = self.catalog_a.all_playlist_items(reference).await?;
        self.ingest_items(playlist_id, items).await
    }

    async fn ingest_liked(&self) -> Result<usize, OrchestratorError> {
        let playlist_id = self.registry.upsert_playlist(LIKED_PLAYLIST_ID, None, "Liked Songs").await?;
        let items = self.catalog_a.all_saved_items().await?;
        self.ingest_items(playlist_id, items).await
    }

    async fn ingest_items(
        &self,
        playlist_id: i64,
        items: Vec<crate::catalog::CatalogAPlaylistItem>,
    ) -> Result<usize, OrchestratorError> {
        let mut retained: Vec<_> = items
            .into_iter()
            .filter_map(|item| {
                let track = item.track?;
                if track.is_local || track.is_episode || track.duration_ms == 0 {
                    return None;
                }
                Some((track, item.added_at))
            })
            .collect();

        // §4.4 step 5: ascending by added-at, null sorts last.
        retained.sort_by(|(_, a), (_, b)| match (a, b) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        // `sync_playlist_tracks` clears and reinserts every retained track on
        // every call, so positions are renumbered from 1 deterministically by
        // added-at order rather than continuing past the previous run's max —
        // otherwise an unchanged playlist would drift upward on each re-sync.
        let mut members = Vec::with_capacity(retained.len());
        for (index, (track, added_at)) in retained.into_iter().enumerate() {
            let metadata = self.build_metadata(&track).await?;
            let track_id = self.registry.upsert_canonical_track(&track.external_id, &metadata).await?;
            members.push((track_id, index as u32 + 1, added_at));
        }

        let count = members.len();
        self.registry.sync_playlist_tracks(playlist_id, &members).await?;
        Ok(count)
    }

    async fn build_metadata(
        &self,
        track: &crate::catalog::CatalogATrack,
    ) -> Result<CanonicalTrackMetadata, OrchestratorError> {
        let mut metadata = CanonicalTrackMetadata::new(
            &track.name,
            &track.primary_artist,
            track.artists.clone(),
            track.duration_ms,
        )?;

        metadata.album = track.album.clone();
        metadata.isrc = track.isrc.clone();
        metadata.cover_url = track.cover_url.clone();
        metadata.explicit = track.explicit;
        metadata.popularity = track.popularity;
        metadata.preview_url = track.preview_url.clone();
        metadata.external_url = track.external_url.clone();
        metadata.track_number = track.track_number;
        metadata.disc_number = track.disc_number;

        if let Some(artist_ref) = &track.artist_ref {
            if let Ok(artist) = self.catalog_a.artist(artist_ref).await {
                metadata.genres = artist.genres;
            }
        }
        if let Some(album_ref) = &track.album_ref {
            if let Ok(album) = self.catalog_a.album(album_ref).await {
                metadata.publisher = album.publisher;
                metadata.copyright = album.copyright;
                metadata.release_date = album.release_date;
                metadata.year = album.year;
                metadata.album_artist = Some(track.primary_artist.clone());
            }
        }

        Ok(metadata)
    }

    /// §4.5: resolve every track the Registry reports as needing a match.
    async fn run_matching(&self, progress: &ProgressBar) -> Result<(usize, usize), OrchestratorError> {
        let tracks = self.registry.tracks_needing_match().await?;
        progress.set_length(tracks.len() as u64);
        let (mut matched, mut failed) = (0, 0);

        for track in tracks {
            if self.cancel.is_cancelled() {
                break;
            }
            progress.inc(1);

            let result = matcher::resolve(&track, self.catalog_b.as_ref()).await?;
            match result {
                crate::domain::match_result::MatchResult::Success { selected, close_alternatives, .. } => {
                    self.registry
                        .set_catalog_b_url(&track.external_id, &selected.result.url, selected.score)
                        .await?;
                    matched += 1;

                    if !close_alternatives.is_empty() {
                        let filename = format!("{}-{}.m4a", track.metadata.name, track.metadata.primary_artist);
                        let alternatives: Vec<(String, String, f64)> = close_alternatives
                            .iter()
                            .map(|c| (c.result.title.clone(), c.result.url.clone(), c.score))
                            .collect();
                        self.structured_log.log_close_alternatives(
                            &filename,
                            &track.metadata.name,
                            track.metadata.external_url.as_deref().unwrap_or(""),
                            &selected.result.title,
                            &selected.result.url,
                            selected.score,
                            &alternatives,
                        );
                    }
                }
                crate::domain::match_result::MatchResult::Failure { .. } => {
                    self.registry.mark_match_failed(&track.external_id).await?;
                    failed += 1;
                }
            }
        }

        Ok((matched, failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_starts_uncancelled() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn phase_selection_all_enables_every_phase() {
        let phases = PhaseSelection::all();
        assert!(phases.ingest && phases.matching && phases.acquisition && phases.lyrics && phases.embedding);
        assert!(!phases.force_rematch);
    }
}
