use chrono::NaiveDateTime;
use sqlx::{Executor, Sqlite};

use crate::domain::playlist_track_link::PlaylistTrackLink;

use super::RegistryError;

#[derive(Debug, sqlx::FromRow)]
struct DbPlaylistTrackLink {
    playlist_id: i64,
    track_id: i64,
    position: i64,
    added_at: Option<NaiveDateTime>,
}

impl TryFrom<DbPlaylistTrackLink> for PlaylistTrackLink {
    type Error = RegistryError;

    fn try_from(row: DbPlaylistTrackLink) -> Result<Self, Self::Error> {
        PlaylistTrackLink::new(row.playlist_id, row.track_id, row.position as u32, row.added_at)
            .map_err(RegistryError::from)
    }
}

pub struct SqlitePlaylistTracksRepository;

impl SqlitePlaylistTracksRepository {
    /// Creates the link if absent; otherwise moves it to the given position.
    /// Invariant I5 holds structurally: this table never cascades a delete
    /// onto `canonical_tracks`.
    pub async fn link_track_to_playlist<'e, E>(
        executor: E,
        playlist_id: i64,
        track_id: i64,
        position: u32,
        added_at: Option<NaiveDateTime>,
    ) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let position = position as i64;

        sqlx::query!(
            r#"
            INSERT INTO playlist_tracks (playlist_id, track_id, position, added_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(playlist_id, track_id) DO UPDATE SET
                position = excluded.position,
                added_at = excluded.added_at
            "#,
            playlist_id,
            track_id,
            position,
            added_at,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn get_playlist_track_ids<'e, E>(
        executor: E,
        playlist_id: i64,
    ) -> Result<Vec<i64>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let ids = sqlx::query_scalar!(
            r#"SELECT track_id FROM playlist_tracks WHERE playlist_id = ?1 ORDER BY position ASC"#,
            playlist_id
        )
        .fetch_all(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(ids)
    }

    pub async fn get_playlist_tracks_snapshot<'e, E>(
        executor: E,
        playlist_id: i64,
    ) -> Result<Vec<PlaylistTrackLink>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as!(
            DbPlaylistTrackLink,
            r#"SELECT playlist_id, track_id, position, added_at FROM playlist_tracks WHERE playlist_id = ?1 ORDER BY position ASC"#,
            playlist_id
        )
        .fetch_all(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        rows.into_iter().map(PlaylistTrackLink::try_from).collect()
    }

    pub async fn delete_link<'e, E>(
        executor: E,
        playlist_id: i64,
        track_id: i64,
    ) -> Result<bool, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query!(
            r#"DELETE FROM playlist_tracks WHERE playlist_id = ?1 AND track_id = ?2"#,
            playlist_id,
            track_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes every link for a playlist without touching `canonical_tracks`
    /// (Invariant I5); used by the sync step to drop stale positions before
    /// re-inserting the current set.
    pub async fn clear_playlist_tracks<'e, E>(
        executor: E,
        playlist_id: i64,
    ) -> Result<u64, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query!(
            r#"DELETE FROM playlist_tracks WHERE playlist_id = ?1"#,
            playlist_id
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(result.rows_affected())
    }

    /// Playlist name + position pairs for every playlist containing this
    /// track, used by the Acquirer to refresh link views after a fresh
    /// download (§4.6 step 7).
    pub async fn memberships_for_track<'e, E>(
        executor: E,
        track_id: i64,
    ) -> Result<Vec<(String, u32)>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query!(
            r#"
            SELECT p.name as "name!", pt.position as "position!"
            FROM playlist_tracks pt
            JOIN playlists p ON p.id = pt.playlist_id
            WHERE pt.track_id = ?1
            "#,
            track_id
        )
        .fetch_all(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(rows.into_iter().map(|row| (row.name, row.position as u32)).collect())
    }

    pub async fn count_playlists_for_track<'e, E>(
        executor: E,
        track_id: i64,
    ) -> Result<i64, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count = sqlx::query_scalar!(
            r#"SELECT COUNT(*) FROM playlist_tracks WHERE track_id = ?1"#,
            track_id
        )
        .fetch_one(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_helpers::prepare_db;
    use crate::repository::{SqliteCanonicalTracksRepository, SqlitePlaylistsRepository};
    use crate::domain::canonical_track::CanonicalTrackMetadata;

    #[tokio::test]
    async fn link_then_fetch_preserves_order() {
        let pool = prepare_db().await.expect("db");

        let playlist_id = SqlitePlaylistsRepository::upsert(&pool, "p1", None, "My Playlist")
            .await
            .expect("playlist");

        let meta = CanonicalTrackMetadata::new("A", "Artist", vec!["Artist".to_string()], 200_000).unwrap();
        let track_a = SqliteCanonicalTracksRepository::upsert_metadata(&pool, "ta", &meta)
            .await
            .expect("track a");
        let track_b = SqliteCanonicalTracksRepository::upsert_metadata(&pool, "tb", &meta)
            .await
            .expect("track b");

        SqlitePlaylistTracksRepository::link_track_to_playlist(&pool, playlist_id, track_b, 2, None)
            .await
            .expect("link b");
        SqlitePlaylistTracksRepository::link_track_to_playlist(&pool, playlist_id, track_a, 1, None)
            .await
            .expect("link a");

        let ids = SqlitePlaylistTracksRepository::get_playlist_track_ids(&pool, playlist_id)
            .await
            .expect("ids");

        assert_eq!(ids, vec![track_a, track_b]);
    }

    #[tokio::test]
    async fn clear_playlist_tracks_never_deletes_canonical_track() {
        let pool = prepare_db().await.expect("db");

        let playlist_id = SqlitePlaylistsRepository::upsert(&pool, "p1", None, "My Playlist")
            .await
            .expect("playlist");
        let meta = CanonicalTrackMetadata::new("A", "Artist", vec!["Artist".to_string()], 200_000).unwrap();
        let track_id = SqliteCanonicalTracksRepository::upsert_metadata(&pool, "ta", &meta)
            .await
            .expect("track");

        SqlitePlaylistTracksRepository::link_track_to_playlist(&pool, playlist_id, track_id, 1, None)
            .await
            .expect("link");
        SqlitePlaylistTracksRepository::clear_playlist_tracks(&pool, playlist_id)
            .await
            .expect("clear");

        let ids = SqlitePlaylistTracksRepository::get_playlist_track_ids(&pool, playlist_id)
            .await
            .expect("ids");
        assert!(ids.is_empty());

        let still_there = SqliteCanonicalTracksRepository::by_external_id(&pool, "ta")
            .await
            .expect("fetch")
            .expect("track must survive link removal");
        assert_eq!(still_there.id, track_id);
    }
}
