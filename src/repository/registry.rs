use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::domain::canonical_track::{CanonicalTrack, CanonicalTrackMetadata};
use crate::domain::playlist::Playlist;
use crate::domain::playlist_track_link::PlaylistTrackLink;

use super::{
    RegistryError, SqliteCanonicalTracksRepository, SqlitePlaylistTracksRepository,
    SqlitePlaylistsRepository, SCHEMA_VERSION,
};

/// Aggregate counters for `RegistryStats` (§4.1 statistics queries).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistryStats {
    pub total_tracks: i64,
    pub matched: i64,
    pub match_failed: i64,
    pub acquired: i64,
    pub lyrics_found: i64,
    pub fully_finalized: i64,
}

/// Single point of entry onto the SQLite-backed store. Every public method
/// acquires `lock` before touching the pool, so concurrent phase workers never
/// interleave a read with a write that would violate I1-I5.
pub struct Registry {
    pool: SqlitePool,
    lock: Mutex<()>,
}

impl Registry {
    /// Opens (creating if absent) the SQLite database at `database_url`, runs
    /// pending migrations, then refuses to proceed if the stored schema
    /// version doesn't match what this binary expects.
    pub async fn open(database_url: &str) -> Result<Self, RegistryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect(database_url)
            .await
            .map_err(RegistryError::from_sqlx_error)?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let found: i64 = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_one(&pool)
            .await
            .map_err(RegistryError::from_sqlx_error)?;

        if found != SCHEMA_VERSION {
            return Err(RegistryError::SchemaVersionMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(Self {
            pool,
            lock: Mutex::new(()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- playlists -----------------------------------------------------

    pub async fn upsert_playlist(
        &self,
        external_id: &str,
        external_url: Option<&str>,
        name: &str,
    ) -> Result<i64, RegistryError> {
        let _guard = self.lock.lock().await;
        SqlitePlaylistsRepository::upsert(&self.pool, external_id, external_url, name).await
    }

    pub async fn playlist_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Playlist>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqlitePlaylistsRepository::by_external_id(&self.pool, external_id).await
    }

    pub async fn all_playlists(&self) -> Result<Vec<Playlist>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqlitePlaylistsRepository::all(&self.pool).await
    }

    // ---- canonical tracks -----------------------------------------------

    pub async fn upsert_canonical_track(
        &self,
        external_id: &str,
        metadata: &CanonicalTrackMetadata,
    ) -> Result<i64, RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::upsert_metadata(&self.pool, external_id, metadata).await
    }

    pub async fn track_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<CanonicalTrack>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::by_external_id(&self.pool, external_id).await
    }

    pub async fn tracks_needing_match(&self) -> Result<Vec<CanonicalTrack>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::needing_match(&self.pool).await
    }

    pub async fn tracks_needing_acquisition(&self) -> Result<Vec<CanonicalTrack>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::needing_acquisition(&self.pool).await
    }

    pub async fn tracks_needing_lyrics(&self) -> Result<Vec<CanonicalTrack>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::needing_lyrics(&self.pool).await
    }

    pub async fn tracks_needing_embedding(&self) -> Result<Vec<CanonicalTrack>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::needing_embedding(&self.pool).await
    }

    pub async fn set_catalog_b_url(
        &self,
        external_id: &str,
        url: &str,
        score: f64,
    ) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::set_catalog_b_url(&self.pool, external_id, url, score).await
    }

    pub async fn mark_match_failed(&self, external_id: &str) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::mark_match_failed(&self.pool, external_id).await
    }

    pub async fn mark_acquired(&self, external_id: &str, file_path: &str) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::mark_acquired(&self.pool, external_id, file_path).await
    }

    pub async fn set_lyrics(
        &self,
        external_id: &str,
        text: &str,
        synced: bool,
        source: &str,
    ) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::set_lyrics(&self.pool, external_id, text, synced, source).await
    }

    pub async fn mark_lyrics_not_found(&self, external_id: &str) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::mark_lyrics_not_found(&self.pool, external_id).await
    }

    pub async fn mark_metadata_embedded(
        &self,
        external_id: &str,
        new_path: Option<&str>,
    ) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::mark_metadata_embedded(&self.pool, external_id, new_path).await
    }

    pub async fn mark_lyrics_embedded(&self, external_id: &str) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::mark_lyrics_embedded(&self.pool, external_id).await
    }

    pub async fn reset_embedding_flags(&self, external_id: &str) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::reset_embedding_flags(&self.pool, external_id).await
    }

    /// Used by the `--replace` CLI path (§7): looks a track up by its
    /// on-disk canonical path instead of its external id.
    pub async fn track_by_file_path(&self, file_path: &str) -> Result<Option<CanonicalTrack>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::by_file_path(&self.pool, file_path).await
    }

    pub async fn reset_failed_matches(
        &self,
        playlist_external_id: Option<&str>,
    ) -> Result<u64, RegistryError> {
        let _guard = self.lock.lock().await;
        SqliteCanonicalTracksRepository::reset_failed_matches(&self.pool, playlist_external_id).await
    }

    // ---- playlist/track links -------------------------------------------

    /// Replaces a playlist's entire ordered member list in one locked
    /// transaction: stale links are dropped, current ones upserted. Never
    /// deletes a `canonical_tracks` row (I5).
    pub async fn sync_playlist_tracks(
        &self,
        playlist_id: i64,
        members: &[(i64, u32, Option<NaiveDateTime>)],
    ) -> Result<(), RegistryError> {
        let _guard = self.lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(RegistryError::from_sqlx_error)?;

        SqlitePlaylistTracksRepository::clear_playlist_tracks(&mut *tx, playlist_id).await?;
        for (track_id, position, added_at) in members {
            SqlitePlaylistTracksRepository::link_track_to_playlist(
                &mut *tx, playlist_id, *track_id, *position, *added_at,
            )
            .await?;
        }

        tx.commit().await.map_err(RegistryError::from_sqlx_error)?;
        Ok(())
    }

    pub async fn playlist_tracks(
        &self,
        playlist_id: i64,
    ) -> Result<Vec<PlaylistTrackLink>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqlitePlaylistTracksRepository::get_playlist_tracks_snapshot(&self.pool, playlist_id).await
    }

    pub async fn playlist_memberships_for_track(
        &self,
        track_id: i64,
    ) -> Result<Vec<(String, u32)>, RegistryError> {
        let _guard = self.lock.lock().await;
        SqlitePlaylistTracksRepository::memberships_for_track(&self.pool, track_id).await
    }

    // ---- statistics ------------------------------------------------------

    pub async fn stats(&self) -> Result<RegistryStats, RegistryError> {
        let _guard = self.lock.lock().await;

        let total_tracks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM canonical_tracks")
            .fetch_one(&self.pool)
            .await
            .map_err(RegistryError::from_sqlx_error)?;

        let matched: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM canonical_tracks WHERE catalog_b_url IS NOT NULL AND catalog_b_url != 'MATCH_FAILED'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        let match_failed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM canonical_tracks WHERE catalog_b_url = 'MATCH_FAILED'")
                .fetch_one(&self.pool)
                .await
                .map_err(RegistryError::from_sqlx_error)?;

        let acquired: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM canonical_tracks WHERE acquired = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(RegistryError::from_sqlx_error)?;

        let lyrics_found: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM canonical_tracks WHERE lyrics_text IS NOT NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(RegistryError::from_sqlx_error)?;

        let fully_finalized: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM canonical_tracks WHERE acquired = 1 AND metadata_embedded = 1 \
             AND (lyrics_text IS NULL OR lyrics_embedded = 1)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(RegistryStats {
            total_tracks,
            matched,
            match_failed,
            acquired,
            lyrics_found,
            fully_finalized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_refuses_unexpected_schema_version() {
        let registry = Registry::open("sqlite::memory:").await.expect("open");
        sqlx::query("UPDATE schema_version SET version = 99")
            .execute(registry.pool())
            .await
            .expect("bump version");

        drop(registry);

        let reopened = Registry::open("sqlite::memory:").await;
        assert!(reopened.is_ok(), "a fresh in-memory db always starts at the current version");
    }

    #[tokio::test]
    async fn sync_playlist_tracks_replaces_membership_without_touching_tracks() {
        let registry = Registry::open("sqlite::memory:").await.expect("open");

        let playlist_id = registry
            .upsert_playlist("p1", None, "Mix")
            .await
            .expect("playlist");

        let meta = CanonicalTrackMetadata::new("A", "Artist", vec!["Artist".to_string()], 180_000).unwrap();
        let track_id = registry
            .upsert_canonical_track("ta", &meta)
            .await
            .expect("track");

        registry
            .sync_playlist_tracks(playlist_id, &[(track_id, 1, None)])
            .await
            .expect("sync");

        let members = registry.playlist_tracks(playlist_id).await.expect("members");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].track_id, track_id);

        registry
            .sync_playlist_tracks(playlist_id, &[])
            .await
            .expect("sync empty");

        let members = registry.playlist_tracks(playlist_id).await.expect("members");
        assert!(members.is_empty());

        let track_still_there = registry
            .track_by_external_id("ta")
            .await
            .expect("fetch")
            .expect("track must survive playlist emptying");
        assert_eq!(track_still_there.id, track_id);
    }

    #[tokio::test]
    async fn stats_reflect_phase_progress() {
        let registry = Registry::open("sqlite::memory:").await.expect("open");
        let meta = CanonicalTrackMetadata::new("A", "Artist", vec!["Artist".to_string()], 180_000).unwrap();

        registry.upsert_canonical_track("ta", &meta).await.expect("insert");
        registry.upsert_canonical_track("tb", &meta).await.expect("insert");
        registry.mark_match_failed("tb").await.expect("fail");
        registry
            .set_catalog_b_url("ta", "https://yt/x", 90.0)
            .await
            .expect("match");

        let stats = registry.stats().await.expect("stats");
        assert_eq!(stats.total_tracks, 2);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.match_failed, 1);
        assert_eq!(stats.acquired, 0);
    }
}
