use chrono::{NaiveDateTime, Utc};
use sqlx::{Executor, Sqlite};
use std::path::PathBuf;

use crate::domain::canonical_track::{CanonicalTrack, CanonicalTrackMetadata, Resolution};
use crate::domain::MATCH_FAILED_SENTINEL;

use super::RegistryError;

#[derive(Debug, sqlx::FromRow)]
struct DbCanonicalTrack {
    id: i64,
    external_id: String,

    name: String,
    primary_artist: String,
    artists: String,
    album: Option<String>,
    album_artist: Option<String>,
    duration_ms: i64,
    isrc: Option<String>,
    cover_url: Option<String>,
    release_date: Option<String>,
    track_number: Option<i64>,
    disc_number: Option<i64>,
    year: Option<i64>,
    genres: String,
    publisher: Option<String>,
    copyright: Option<String>,
    explicit: i64,
    popularity: Option<i64>,
    preview_url: Option<String>,
    external_url: Option<String>,
    metadata: Option<String>,

    catalog_b_url: Option<String>,
    match_score: Option<f64>,
    match_at: Option<NaiveDateTime>,

    acquired: i64,
    acquired_at: Option<NaiveDateTime>,
    file_path: Option<String>,

    lyrics_attempted: i64,
    lyrics_text: Option<String>,
    lyrics_synced: i64,
    lyrics_source: Option<String>,

    metadata_embedded: i64,
    lyrics_embedded: i64,

    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl TryFrom<DbCanonicalTrack> for CanonicalTrack {
    type Error = RegistryError;

    fn try_from(row: DbCanonicalTrack) -> Result<Self, Self::Error> {
        let artists: Vec<String> = serde_json::from_str(&row.artists)?;
        let genres: Vec<String> = serde_json::from_str(&row.genres)?;
        let metadata = row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        let meta = CanonicalTrackMetadata {
            name: row.name,
            primary_artist: row.primary_artist,
            artists,
            album: row.album,
            album_artist: row.album_artist,
            duration_ms: row.duration_ms as u32,
            isrc: row.isrc,
            cover_url: row.cover_url,
            release_date: row.release_date,
            track_number: row.track_number.map(|v| v as u32),
            disc_number: row.disc_number.map(|v| v as u32),
            year: row.year.map(|v| v as u32),
            genres,
            publisher: row.publisher,
            copyright: row.copyright,
            explicit: row.explicit != 0,
            popularity: row.popularity.map(|v| v as u32),
            preview_url: row.preview_url,
            external_url: row.external_url,
            metadata,
        };

        Ok(CanonicalTrack {
            id: row.id,
            external_id: row.external_id,
            metadata: meta,
            resolution: Resolution::from_columns(row.catalog_b_url, row.match_score),
            match_at: row.match_at,
            acquired: row.acquired != 0,
            acquired_at: row.acquired_at,
            file_path: row.file_path.map(PathBuf::from),
            lyrics_attempted: row.lyrics_attempted != 0,
            lyrics_text: row.lyrics_text,
            lyrics_synced: row.lyrics_synced != 0,
            lyrics_source: row.lyrics_source,
            metadata_embedded: row.metadata_embedded != 0,
            lyrics_embedded: row.lyrics_embedded != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    id, external_id, name, primary_artist, artists, album, album_artist, duration_ms,
    isrc, cover_url, release_date, track_number, disc_number, year, genres, publisher,
    copyright, explicit, popularity, preview_url, external_url, metadata,
    catalog_b_url, match_score, match_at,
    acquired, acquired_at, file_path,
    lyrics_attempted, lyrics_text, lyrics_synced, lyrics_source,
    metadata_embedded, lyrics_embedded,
    created_at, updated_at
"#;

pub struct SqliteCanonicalTracksRepository;

impl SqliteCanonicalTracksRepository {
    /// `UpsertCanonicalTrack`: creates the row if absent, else updates catalog-A
    /// metadata columns only. Never touches resolution/acquisition/enrichment/
    /// finalization state (Invariant I1) because those columns are absent from
    /// the `DO UPDATE SET` clause.
    pub async fn upsert_metadata<'e, E>(
        executor: E,
        external_id: &str,
        metadata: &CanonicalTrackMetadata,
    ) -> Result<i64, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let artists_json = serde_json::to_string(&metadata.artists)?;
        let genres_json = serde_json::to_string(&metadata.genres)?;
        let metadata_json = metadata
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now().naive_utc();
        let duration_ms = metadata.duration_ms as i64;
        let track_number = metadata.track_number.map(|v| v as i64);
        let disc_number = metadata.disc_number.map(|v| v as i64);
        let year = metadata.year.map(|v| v as i64);
        let popularity = metadata.popularity.map(|v| v as i64);
        let explicit = metadata.explicit as i64;

        let id = sqlx::query_scalar!(
            r#"
            INSERT INTO canonical_tracks (
                external_id, name, primary_artist, artists, album, album_artist, duration_ms,
                isrc, cover_url, release_date, track_number, disc_number, year, genres,
                publisher, copyright, explicit, popularity, preview_url, external_url, metadata,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?22
            )
            ON CONFLICT(external_id) DO UPDATE SET
                name = excluded.name,
                primary_artist = excluded.primary_artist,
                artists = excluded.artists,
                album = excluded.album,
                album_artist = excluded.album_artist,
                duration_ms = excluded.duration_ms,
                isrc = excluded.isrc,
                cover_url = excluded.cover_url,
                release_date = excluded.release_date,
                track_number = excluded.track_number,
                disc_number = excluded.disc_number,
                year = excluded.year,
                genres = excluded.genres,
                publisher = excluded.publisher,
                copyright = excluded.copyright,
                explicit = excluded.explicit,
                popularity = excluded.popularity,
                preview_url = excluded.preview_url,
                external_url = excluded.external_url,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
            external_id,
            metadata.name,
            metadata.primary_artist,
            artists_json,
            metadata.album,
            metadata.album_artist,
            duration_ms,
            metadata.isrc,
            metadata.cover_url,
            metadata.release_date,
            track_number,
            disc_number,
            year,
            genres_json,
            metadata.publisher,
            metadata.copyright,
            explicit,
            popularity,
            metadata.preview_url,
            metadata.external_url,
            metadata_json,
            now,
        )
        .fetch_one(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(id)
    }

    pub async fn by_external_id<'e, E>(
        executor: E,
        external_id: &str,
    ) -> Result<Option<CanonicalTrack>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let query = format!("SELECT {SELECT_COLUMNS} FROM canonical_tracks WHERE external_id = ?1");

        let row: Option<DbCanonicalTrack> = sqlx::query_as(&query)
            .bind(external_id)
            .fetch_optional(executor)
            .await
            .map_err(RegistryError::from_sqlx_error)?;

        row.map(CanonicalTrack::try_from).transpose()
    }

    /// Used by the `--replace` CLI path, which identifies a track by its
    /// on-disk canonical path rather than its external id (§7).
    pub async fn by_file_path<'e, E>(
        executor: E,
        file_path: &str,
    ) -> Result<Option<CanonicalTrack>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let query = format!("SELECT {SELECT_COLUMNS} FROM canonical_tracks WHERE file_path = ?1");

        let row: Option<DbCanonicalTrack> = sqlx::query_as(&query)
            .bind(file_path)
            .fetch_optional(executor)
            .await
            .map_err(RegistryError::from_sqlx_error)?;

        row.map(CanonicalTrack::try_from).transpose()
    }

    async fn select_where<'e, E>(
        executor: E,
        predicate: &str,
    ) -> Result<Vec<CanonicalTrack>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM canonical_tracks WHERE {predicate} ORDER BY created_at ASC"
        );

        let rows: Vec<DbCanonicalTrack> = sqlx::query_as(&query)
            .fetch_all(executor)
            .await
            .map_err(RegistryError::from_sqlx_error)?;

        rows.into_iter().map(CanonicalTrack::try_from).collect()
    }

    /// Tracks with no catalog-B URL recorded yet (never attempted).
    pub async fn needing_match<'e, E>(executor: E) -> Result<Vec<CanonicalTrack>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::select_where(executor, "catalog_b_url IS NULL").await
    }

    /// Invariant I2.
    pub async fn needing_acquisition<'e, E>(executor: E) -> Result<Vec<CanonicalTrack>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::select_where(
            executor,
            "catalog_b_url IS NOT NULL AND catalog_b_url != 'MATCH_FAILED' AND acquired = 0",
        )
        .await
    }

    /// Invariant I3.
    pub async fn needing_lyrics<'e, E>(executor: E) -> Result<Vec<CanonicalTrack>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::select_where(executor, "acquired = 1 AND lyrics_attempted = 0").await
    }

    /// Invariant I4.
    pub async fn needing_embedding<'e, E>(executor: E) -> Result<Vec<CanonicalTrack>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        Self::select_where(
            executor,
            "acquired = 1 AND (metadata_embedded = 0 OR \
             (lyrics_attempted = 1 AND lyrics_text IS NOT NULL AND lyrics_embedded = 0))",
        )
        .await
    }

    pub async fn set_catalog_b_url<'e, E>(
        executor: E,
        external_id: &str,
        url: &str,
        score: f64,
    ) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query!(
            r#"UPDATE canonical_tracks SET catalog_b_url = ?1, match_score = ?2, match_at = ?3, updated_at = ?3 WHERE external_id = ?4"#,
            url,
            score,
            now,
            external_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    /// Writes the [`MATCH_FAILED_SENTINEL`] with score 0, per §4.1.
    pub async fn mark_match_failed<'e, E>(executor: E, external_id: &str) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query!(
            r#"UPDATE canonical_tracks SET catalog_b_url = ?1, match_score = 0, match_at = ?2, updated_at = ?2 WHERE external_id = ?3"#,
            MATCH_FAILED_SENTINEL,
            now,
            external_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn mark_acquired<'e, E>(
        executor: E,
        external_id: &str,
        file_path: &str,
    ) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query!(
            r#"UPDATE canonical_tracks SET acquired = 1, acquired_at = ?1, file_path = ?2, updated_at = ?1 WHERE external_id = ?3"#,
            now,
            file_path,
            external_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn set_lyrics<'e, E>(
        executor: E,
        external_id: &str,
        text: &str,
        synced: bool,
        source: &str,
    ) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();
        let synced = synced as i64;

        sqlx::query!(
            r#"UPDATE canonical_tracks SET lyrics_attempted = 1, lyrics_text = ?1, lyrics_synced = ?2, lyrics_source = ?3, updated_at = ?4 WHERE external_id = ?5"#,
            text,
            synced,
            source,
            now,
            external_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    /// Sets `lyrics_attempted` without touching `lyrics_text`, so a track that
    /// already has text from a prior `set_lyrics` call keeps it (R3).
    pub async fn mark_lyrics_not_found<'e, E>(executor: E, external_id: &str) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query!(
            r#"UPDATE canonical_tracks SET lyrics_attempted = 1, updated_at = ?1 WHERE external_id = ?2"#,
            now,
            external_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn mark_metadata_embedded<'e, E>(
        executor: E,
        external_id: &str,
        new_path: Option<&str>,
    ) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query!(
            r#"UPDATE canonical_tracks SET metadata_embedded = 1, file_path = COALESCE(?1, file_path), updated_at = ?2 WHERE external_id = ?3"#,
            new_path,
            now,
            external_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    pub async fn mark_lyrics_embedded<'e, E>(executor: E, external_id: &str) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query!(
            r#"UPDATE canonical_tracks SET lyrics_embedded = 1, updated_at = ?1 WHERE external_id = ?2"#,
            now,
            external_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    /// Used after an out-of-band audio replacement (`--replace`) so the next
    /// embedding pass re-applies canonical tags to the new file.
    pub async fn reset_embedding_flags<'e, E>(executor: E, external_id: &str) -> Result<(), RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query!(
            r#"UPDATE canonical_tracks SET metadata_embedded = 0, lyrics_embedded = 0, updated_at = ?1 WHERE external_id = ?2"#,
            now,
            external_id,
        )
        .execute(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        Ok(())
    }

    /// Global scope when `playlist_external_id` is `None`; otherwise restricted
    /// to tracks linked into that one playlist. Returns the number reset.
    pub async fn reset_failed_matches<'e, E>(
        executor: E,
        playlist_external_id: Option<&str>,
    ) -> Result<u64, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        let affected = match playlist_external_id {
            None => {
                sqlx::query!(
                    r#"UPDATE canonical_tracks SET catalog_b_url = NULL, match_score = NULL, match_at = NULL, updated_at = ?1 WHERE catalog_b_url = ?2"#,
                    now,
                    MATCH_FAILED_SENTINEL,
                )
                .execute(executor)
                .await
                .map_err(RegistryError::from_sqlx_error)?
                .rows_affected()
            }
            Some(playlist_id) => {
                sqlx::query!(
                    r#"
                    UPDATE canonical_tracks SET catalog_b_url = NULL, match_score = NULL, match_at = NULL, updated_at = ?1
                    WHERE catalog_b_url = ?2 AND id IN (
                        SELECT pt.track_id FROM playlist_tracks pt
                        JOIN playlists p ON p.id = pt.playlist_id
                        WHERE p.external_id = ?3
                    )
                    "#,
                    now,
                    MATCH_FAILED_SENTINEL,
                    playlist_id,
                )
                .execute(executor)
                .await
                .map_err(RegistryError::from_sqlx_error)?
                .rows_affected()
            }
        };

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_helpers::prepare_db;

    fn sample_metadata() -> CanonicalTrackMetadata {
        CanonicalTrackMetadata::new("Bohemian Rhapsody", "Queen", vec!["Queen".to_string()], 354_000)
            .expect("valid metadata")
    }

    #[tokio::test]
    async fn upsert_then_fetch_round_trips_metadata() {
        let pool = prepare_db().await.expect("db");
        let metadata = sample_metadata();

        let id = SqliteCanonicalTracksRepository::upsert_metadata(&pool, "spotify:track:1", &metadata)
            .await
            .expect("upsert");
        assert!(id > 0);

        let fetched = SqliteCanonicalTracksRepository::by_external_id(&pool, "spotify:track:1")
            .await
            .expect("fetch")
            .expect("present");

        assert_eq!(fetched.metadata.name, metadata.name);
        assert_eq!(fetched.metadata.primary_artist, metadata.primary_artist);
        assert_eq!(fetched.resolution, Resolution::Unresolved);
        assert!(!fetched.acquired);
    }

    #[tokio::test]
    async fn reupsert_preserves_resolution_state() {
        let pool = prepare_db().await.expect("db");
        let metadata = sample_metadata();

        SqliteCanonicalTracksRepository::upsert_metadata(&pool, "spotify:track:1", &metadata)
            .await
            .expect("upsert");
        SqliteCanonicalTracksRepository::set_catalog_b_url(&pool, "spotify:track:1", "https://yt/x", 91.5)
            .await
            .expect("set url");

        let mut updated = metadata.clone();
        updated.album = Some("A Night at the Opera".to_string());
        SqliteCanonicalTracksRepository::upsert_metadata(&pool, "spotify:track:1", &updated)
            .await
            .expect("reupsert");

        let fetched = SqliteCanonicalTracksRepository::by_external_id(&pool, "spotify:track:1")
            .await
            .expect("fetch")
            .expect("present");

        assert_eq!(fetched.metadata.album.as_deref(), Some("A Night at the Opera"));
        assert_eq!(
            fetched.resolution,
            Resolution::Resolved { url: "https://yt/x".to_string(), score: 91.5 }
        );
    }

    #[tokio::test]
    async fn eligibility_queries_follow_invariants() {
        let pool = prepare_db().await.expect("db");
        let metadata = sample_metadata();

        SqliteCanonicalTracksRepository::upsert_metadata(&pool, "t1", &metadata)
            .await
            .expect("upsert");

        let needing_match = SqliteCanonicalTracksRepository::needing_match(&pool)
            .await
            .expect("query");
        assert_eq!(needing_match.len(), 1);

        SqliteCanonicalTracksRepository::mark_match_failed(&pool, "t1")
            .await
            .expect("fail");

        let needing_acquisition = SqliteCanonicalTracksRepository::needing_acquisition(&pool)
            .await
            .expect("query");
        assert!(needing_acquisition.is_empty(), "failure sentinel must never be acquisition-eligible");

        SqliteCanonicalTracksRepository::set_catalog_b_url(&pool, "t1", "https://yt/good", 80.0)
            .await
            .expect("resolve");

        let needing_acquisition = SqliteCanonicalTracksRepository::needing_acquisition(&pool)
            .await
            .expect("query");
        assert_eq!(needing_acquisition.len(), 1);

        SqliteCanonicalTracksRepository::mark_acquired(&pool, "t1", "/music/tracks/a.m4a")
            .await
            .expect("acquire");

        let needing_lyrics = SqliteCanonicalTracksRepository::needing_lyrics(&pool)
            .await
            .expect("query");
        assert_eq!(needing_lyrics.len(), 1);

        let needing_embedding = SqliteCanonicalTracksRepository::needing_embedding(&pool)
            .await
            .expect("query");
        assert_eq!(needing_embedding.len(), 1, "metadata not yet embedded");

        SqliteCanonicalTracksRepository::mark_lyrics_not_found(&pool, "t1")
            .await
            .expect("not found");

        let needing_lyrics = SqliteCanonicalTracksRepository::needing_lyrics(&pool)
            .await
            .expect("query");
        assert!(needing_lyrics.is_empty());
    }

    #[tokio::test]
    async fn reset_failed_matches_clears_sentinel() {
        let pool = prepare_db().await.expect("db");
        SqliteCanonicalTracksRepository::upsert_metadata(&pool, "t1", &sample_metadata())
            .await
            .expect("upsert");
        SqliteCanonicalTracksRepository::mark_match_failed(&pool, "t1")
            .await
            .expect("fail");

        let reset = SqliteCanonicalTracksRepository::reset_failed_matches(&pool, None)
            .await
            .expect("reset");
        assert_eq!(reset, 1);

        let needing_match = SqliteCanonicalTracksRepository::needing_match(&pool)
            .await
            .expect("query");
        assert_eq!(needing_match.len(), 1);
    }
}
