use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::normalizations::sanitize_filename;

#[derive(Debug, thiserror::Error)]
pub enum FileManagerError {
    #[error("canonical file not found at {0}")]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const CANONICAL_EXTENSION: &str = "m4a";

/// Central storage plus per-playlist link views (§4.2). One physical file
/// per unique track lives under `tracks/`; playlists get hard-linked (or, as
/// a fallback, symlinked) views under `Playlists/<name>/`.
pub struct FileManager {
    root: PathBuf,
}

impl FileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn tracks_dir(&self) -> PathBuf {
        self.root.join("tracks")
    }

    pub fn playlists_dir(&self) -> PathBuf {
        self.root.join("Playlists")
    }

    fn track_filename(title: &str, artist: &str) -> String {
        format!("{}-{}.{CANONICAL_EXTENSION}", sanitize_filename(title), sanitize_filename(artist))
    }

    /// `CanonicalPath(artist, title)`: pure function, no I/O.
    pub fn canonical_path(&self, title: &str, artist: &str) -> PathBuf {
        self.tracks_dir().join(Self::track_filename(title, artist))
    }

    pub fn playlist_dir(&self, playlist_name: &str) -> PathBuf {
        self.playlists_dir().join(sanitize_filename(playlist_name))
    }

    fn link_filename(position: u32, title: &str, artist: &str) -> String {
        format!(
            "{position:05}-{}-{}.{CANONICAL_EXTENSION}",
            sanitize_filename(title),
            sanitize_filename(artist)
        )
    }

    pub fn playlist_link_path(&self, playlist_name: &str, position: u32, title: &str, artist: &str) -> PathBuf {
        self.playlist_dir(playlist_name)
            .join(Self::link_filename(position, title, artist))
    }

    /// Removes any existing link at the target, then attempts a hard link;
    /// falls back to a relative symlink on cross-device or unsupported
    /// filesystems.
    pub fn create_playlist_link(
        &self,
        canonical_path: &Path,
        playlist_name: &str,
        position: u32,
        title: &str,
        artist: &str,
    ) -> Result<(), FileManagerError> {
        if !canonical_path.exists() {
            return Err(FileManagerError::FileNotFound(canonical_path.to_path_buf()));
        }

        let playlist_dir = self.playlist_dir(playlist_name);
        fs::create_dir_all(&playlist_dir)?;

        let link_path = self.playlist_link_path(playlist_name, position, title, artist);
        if link_path.exists() || link_path.symlink_metadata().is_ok() {
            fs::remove_file(&link_path)?;
        }

        if fs::hard_link(canonical_path, &link_path).is_ok() {
            return Ok(());
        }

        let relative = pathdiff(canonical_path, &playlist_dir);
        symlink(&relative, &link_path)?;

        Ok(())
    }

    /// Best-effort across playlists: one failure does not abort the batch.
    /// Returns the playlists that failed, paired with the error.
    pub fn update_all_playlist_links(
        &self,
        canonical_path: &Path,
        title: &str,
        artist: &str,
        memberships: &[(String, u32)],
    ) -> Vec<(String, FileManagerError)> {
        let mut failures = Vec::new();

        for (playlist_name, position) in memberships {
            if let Err(err) =
                self.create_playlist_link(canonical_path, playlist_name, *position, title, artist)
            {
                failures.push((playlist_name.clone(), err));
            }
        }

        failures
    }

    /// Deletes the playlist directory, then recreates links from the
    /// supplied track list. Used when sync detects position changes.
    pub fn rebuild_playlist_from_tracks(
        &self,
        playlist_name: &str,
        tracks: &[(PathBuf, u32, String, String)],
    ) -> Result<Vec<(String, FileManagerError)>, FileManagerError> {
        self.delete_playlist_directory(playlist_name)?;

        let mut failures = Vec::new();
        for (canonical_path, position, title, artist) in tracks {
            if let Err(err) =
                self.create_playlist_link(canonical_path, playlist_name, *position, title, artist)
            {
                failures.push((format!("{position:05}-{title}-{artist}"), err));
            }
        }

        Ok(failures)
    }

    /// Removes link files whose leading zero-padded position is not in
    /// `valid_positions`.
    pub fn cleanup_playlist_orphans(
        &self,
        playlist_name: &str,
        valid_positions: &HashSet<u32>,
    ) -> Result<usize, FileManagerError> {
        let dir = self.playlist_dir(playlist_name);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();

            let Some(prefix) = filename.split('-').next() else {
                continue;
            };
            let Ok(position) = prefix.parse::<u32>() else {
                continue;
            };

            if !valid_positions.contains(&position) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// `#EXTM3U` header, then one `#EXTINF` plus relative path per track.
    pub fn export_playlist_m3u(
        &self,
        tracks: &[(PathBuf, u32, String, String)],
        export_dir: &Path,
    ) -> Result<PathBuf, FileManagerError> {
        fs::create_dir_all(export_dir)?;
        let m3u_path = export_dir.join("playlist.m3u");

        let mut contents = String::from("#EXTM3U\n");
        for (canonical_path, duration_seconds, title, artist) in tracks {
            contents.push_str(&format!("#EXTINF:{duration_seconds},{artist} - {title}\n"));
            let relative = pathdiff(canonical_path, export_dir);
            contents.push_str(&format!("{}\n", relative.display()));
        }

        fs::write(&m3u_path, contents)?;
        Ok(m3u_path)
    }

    pub fn export_playlist_copy(
        &self,
        tracks: &[PathBuf],
        export_dir: &Path,
    ) -> Result<usize, FileManagerError> {
        fs::create_dir_all(export_dir)?;

        let mut copied = 0;
        for track in tracks {
            if let Some(filename) = track.file_name() {
                fs::copy(track, export_dir.join(filename))?;
                copied += 1;
            }
        }

        Ok(copied)
    }

    pub fn file_exists_in_tracks(&self, title: &str, artist: &str) -> bool {
        self.canonical_path(title, artist).exists()
    }

    pub fn get_track_file_count(&self) -> Result<usize, FileManagerError> {
        let dir = self.tracks_dir();
        if !dir.exists() {
            return Ok(0);
        }
        Ok(fs::read_dir(dir)?.count())
    }

    pub fn get_total_size_bytes(&self) -> Result<u64, FileManagerError> {
        let dir = self.tracks_dir();
        if !dir.exists() {
            return Ok(0);
        }

        let mut total = 0;
        for entry in fs::read_dir(dir)? {
            total += entry?.metadata()?.len();
        }
        Ok(total)
    }

    pub fn delete_playlist_directory(&self, playlist_name: &str) -> Result<(), FileManagerError> {
        let dir = self.playlist_dir(playlist_name);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Minimal relative-path diff for the common case here: both paths share the
/// same filesystem root and `to` is an ancestor-adjacent directory.
fn pathdiff(target: &Path, from_dir: &Path) -> PathBuf {
    match pathdiff_inner(target, from_dir) {
        Some(relative) => relative,
        None => target.to_path_buf(),
    }
}

fn pathdiff_inner(target: &Path, from_dir: &Path) -> Option<PathBuf> {
    let target = target.canonicalize().ok()?;
    let mut from_dir = from_dir.to_path_buf();
    if !from_dir.exists() {
        return None;
    }
    from_dir = from_dir.canonicalize().ok()?;

    let target_components: Vec<_> = target.components().collect();
    let from_components: Vec<_> = from_dir.components().collect();

    let common_len = target_components
        .iter()
        .zip(from_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common_len..from_components.len() {
        relative.push("..");
    }
    for component in &target_components[common_len..] {
        relative.push(component);
    }

    Some(relative)
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"audio bytes").unwrap();
    }

    #[test]
    fn canonical_path_sanitizes_title_and_artist() {
        let manager = FileManager::new("/music");
        let path = manager.canonical_path("A/C: Song?", "Weird\\Artist");
        assert_eq!(path, PathBuf::from("/music/tracks/A_C_ Song_-Weird_Artist.m4a"));
    }

    #[test]
    fn create_playlist_link_hard_links_to_canonical_file() {
        let root = tempdir().expect("tempdir");
        let manager = FileManager::new(root.path());
        let canonical = manager.canonical_path("Song", "Artist");
        touch(&canonical);

        manager
            .create_playlist_link(&canonical, "My Mix", 1, "Song", "Artist")
            .expect("link");

        let link_path = manager.playlist_link_path("My Mix", 1, "Song", "Artist");
        assert!(link_path.exists());
        assert_eq!(fs::read(&link_path).unwrap(), fs::read(&canonical).unwrap());
    }

    #[test]
    fn create_playlist_link_missing_canonical_file_is_rejected() {
        let root = tempdir().expect("tempdir");
        let manager = FileManager::new(root.path());
        let canonical = manager.canonical_path("Ghost", "Nobody");

        let err = manager
            .create_playlist_link(&canonical, "My Mix", 1, "Ghost", "Nobody")
            .unwrap_err();
        assert!(matches!(err, FileManagerError::FileNotFound(_)));
    }

    #[test]
    fn cleanup_playlist_orphans_removes_stale_positions_only() {
        let root = tempdir().expect("tempdir");
        let manager = FileManager::new(root.path());

        let canonical_a = manager.canonical_path("A", "Artist");
        touch(&canonical_a);
        let canonical_b = manager.canonical_path("B", "Artist");
        touch(&canonical_b);

        manager
            .create_playlist_link(&canonical_a, "Mix", 1, "A", "Artist")
            .unwrap();
        manager
            .create_playlist_link(&canonical_b, "Mix", 2, "B", "Artist")
            .unwrap();

        let valid = HashSet::from([1]);
        let removed = manager.cleanup_playlist_orphans("Mix", &valid).unwrap();

        assert_eq!(removed, 1);
        assert!(manager.playlist_link_path("Mix", 1, "A", "Artist").exists());
        assert!(!manager.playlist_link_path("Mix", 2, "B", "Artist").exists());
    }
}
