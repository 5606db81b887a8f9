use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::repository::Registry;
use crate::services::file_manager::FileManager;
use crate::services::AcquisitionError;
use crate::utils::logging::StructuredLogger;

const TARGET_CONTAINER: &str = "m4a";
const EXTRACTOR_RETRIES: u32 = 3;
const EXTRACTOR_FRAGMENT_RETRIES: u32 = 3;

/// Abstraction over the external audio extractor tool (§4.6 step 3), mirroring
/// the teacher's `Resampler` trait: a thin seam around `Command` so the
/// service itself stays testable without shelling out.
pub trait Extractor {
    fn extract(&self, url: &str, output_dir: &Path, cookies_file: Option<&Path>) -> Result<(), AcquisitionError>;
}

pub struct YtDlpExtractor {
    binary_path: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self { binary_path: binary_path.into() }
    }
}

impl Extractor for YtDlpExtractor {
    fn extract(&self, url: &str, output_dir: &Path, cookies_file: Option<&Path>) -> Result<(), AcquisitionError> {
        let output_template = output_dir.join("%(id)s.%(ext)s");

        let mut command = Command::new(&self.binary_path);
        command
            .arg(url)
            .args(["-f", "bestaudio[ext=m4a]/bestaudio/best"])
            .args(["--retries", &EXTRACTOR_RETRIES.to_string()])
            .args(["--fragment-retries", &EXTRACTOR_FRAGMENT_RETRIES.to_string()])
            .args(["-x", "--audio-format", TARGET_CONTAINER])
            .args(["--quiet", "--no-progress"])
            .args(["-o", &output_template.to_string_lossy()]);

        if let Some(cookies) = cookies_file {
            command.args(["--cookies", &cookies.to_string_lossy()]);
        }

        let output = command.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(AcquisitionError::ExtractorFailed(stderr));
        }

        Ok(())
    }
}

pub struct AcquisitionOutcome {
    pub track_id: i64,
    pub skipped: bool,
}

pub struct Acquirer<E: Extractor> {
    registry: Arc<Registry>,
    file_manager: Arc<FileManager>,
    extractor: Arc<E>,
    structured_log: Arc<StructuredLogger>,
    cookies_file: Option<PathBuf>,
    semaphore: Arc<Semaphore>,
}

// Hand-written rather than `#[derive(Clone)]` so cloning an `Acquirer` never
// requires `E: Clone` — only `Arc<E>` needs to be cheap to clone, and it is.
impl<E: Extractor> Clone for Acquirer<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            file_manager: self.file_manager.clone(),
            extractor: self.extractor.clone(),
            structured_log: self.structured_log.clone(),
            cookies_file: self.cookies_file.clone(),
            semaphore: self.semaphore.clone(),
        }
    }
}

impl<E: Extractor + Sync + Send + 'static> Acquirer<E> {
    pub fn new(
        registry: Arc<Registry>,
        file_manager: Arc<FileManager>,
        extractor: E,
        structured_log: Arc<StructuredLogger>,
        cookies_file: Option<PathBuf>,
        worker_count: usize,
    ) -> Self {
        Self {
            registry,
            file_manager,
            extractor: Arc::new(extractor),
            structured_log,
            cookies_file,
            semaphore: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }

    /// Runs phase 3 for every track returned by `Registry::tracks_needing_acquisition`.
    /// Each track's extraction is spawned as its own task holding a semaphore
    /// permit for its lifetime, so up to `worker_count` extractor subprocesses
    /// run concurrently rather than one at a time.
    pub async fn run_pending(&self, progress: &ProgressBar) -> Result<Vec<AcquisitionOutcome>, AcquisitionError> {
        let tracks = self.registry.tracks_needing_acquisition().await?;
        progress.set_length(tracks.len() as u64);

        let mut joins = JoinSet::new();
        for track in tracks {
            let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let acquirer = self.clone();
            joins.spawn(async move {
                let result = acquirer.acquire_one(&track).await;
                drop(permit);
                result
            });
        }

        let mut outcomes = Vec::with_capacity(joins.len());
        while let Some(joined) = joins.join_next().await {
            let result = joined.expect("acquisition task panicked");
            progress.inc(1);
            outcomes.push(result?);
        }

        Ok(outcomes)
    }

    async fn acquire_one(
        &self,
        track: &crate::domain::canonical_track::CanonicalTrack,
    ) -> Result<AcquisitionOutcome, AcquisitionError> {
        let title = &track.metadata.name;
        let artist = &track.metadata.primary_artist;

        let canonical_path = self.file_manager.canonical_path(title, artist);
        if self.file_manager.file_exists_in_tracks(title, artist) {
            self.registry
                .mark_acquired(&track.external_id, &canonical_path.to_string_lossy())
                .await?;
            return Ok(AcquisitionOutcome { track_id: track.id, skipped: true });
        }

        let catalog_b_url = match &track.resolution {
            crate::domain::canonical_track::Resolution::Resolved { url, .. } => url.clone(),
            _ => return Err(AcquisitionError::ExtractorFailed("track has no resolved catalog-B url".into())),
        };

        let temp_dir = tempfile::Builder::new()
            .prefix("acquire-")
            .tempdir()
            .map_err(AcquisitionError::Io)?;

        let extractor = self.extractor.clone();
        let url = catalog_b_url.clone();
        let cookies_file = self.cookies_file.clone();
        let temp_path = temp_dir.path().to_path_buf();
        let extraction = tokio::task::spawn_blocking(move || extractor.extract(&url, &temp_path, cookies_file.as_deref()))
            .await
            .expect("extractor task panicked");

        let result = match extraction {
            Ok(()) => self.finish_acquisition(track, temp_dir.path(), &canonical_path).await,
            Err(err) => Err(err),
        };

        if let Err(AcquisitionError::ExtractorFailed(ref reason)) = result {
            let position = self
                .registry
                .playlist_memberships_for_track(track.id)
                .await
                .ok()
                .and_then(|memberships| memberships.first().map(|(_, position)| *position))
                .unwrap_or(0);
            let catalog_a_url = track.metadata.external_url.as_deref().unwrap_or(&track.external_id);
            self.structured_log.log_download_failure(position, title, artist, TARGET_CONTAINER, catalog_a_url);
            log::error!("acquisition failed for {title} - {artist}: {reason}");
        }

        result.map(|_| AcquisitionOutcome { track_id: track.id, skipped: false })
    }

    async fn finish_acquisition(
        &self,
        track: &crate::domain::canonical_track::CanonicalTrack,
        temp_dir: &Path,
        canonical_path: &Path,
    ) -> Result<(), AcquisitionError> {
        let produced = locate_output_file(temp_dir)?;

        if let Some(parent) = canonical_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        move_or_copy(&produced, canonical_path)?;

        self.registry
            .mark_acquired(&track.external_id, &canonical_path.to_string_lossy())
            .await?;

        let memberships = self.registry.playlist_memberships_for_track(track.id).await?;
        let failures = self.file_manager.update_all_playlist_links(
            canonical_path,
            &track.metadata.name,
            &track.metadata.primary_artist,
            &memberships,
        );
        for (playlist, err) in failures {
            log::warn!("failed to refresh playlist link for {playlist}: {err}");
        }

        Ok(())
    }
}

/// Step 4: prefer the target extension, fall back to any file present.
pub(crate) fn locate_output_file(dir: &Path) -> Result<PathBuf, AcquisitionError> {
    let mut fallback = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(TARGET_CONTAINER) {
            return Ok(path);
        }
        if fallback.is_none() && path.is_file() {
            fallback = Some(path);
        }
    }

    fallback.ok_or_else(|| AcquisitionError::NoOutputProduced(dir.display().to_string()))
}

pub(crate) fn move_or_copy(from: &Path, to: &Path) -> Result<(), std::io::Error> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeExtractor {
        output_contents: &'static [u8],
        fail: bool,
    }

    impl Extractor for FakeExtractor {
        fn extract(&self, _url: &str, output_dir: &Path, _cookies_file: Option<&Path>) -> Result<(), AcquisitionError> {
            if self.fail {
                return Err(AcquisitionError::ExtractorFailed("fake failure".into()));
            }
            std::fs::write(output_dir.join("abc123.m4a"), self.output_contents).unwrap();
            Ok(())
        }
    }

    #[test]
    fn locate_output_file_prefers_target_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("abc.m4a"), b"y").unwrap();

        let found = locate_output_file(dir.path()).unwrap();
        assert_eq!(found.extension().unwrap(), "m4a");
    }

    #[test]
    fn locate_output_file_falls_back_to_any_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.webm"), b"x").unwrap();

        let found = locate_output_file(dir.path()).unwrap();
        assert_eq!(found.extension().unwrap(), "webm");
    }

    #[test]
    fn locate_output_file_errors_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_output_file(dir.path()).unwrap_err();
        assert!(matches!(err, AcquisitionError::NoOutputProduced(_)));
    }

    #[test]
    fn fake_extractor_reports_failure_through_the_error_type() {
        let extractor = FakeExtractor { output_contents: b"", fail: true };
        let dir = tempfile::tempdir().unwrap();
        let err = extractor.extract("https://example/video", dir.path(), None).unwrap_err();
        assert!(matches!(err, AcquisitionError::ExtractorFailed(_)));
        let _ = Mutex::new(());
    }
}
