use chrono::{NaiveDateTime, Utc};
use sqlx::{Executor, Sqlite};

use crate::domain::playlist::Playlist;

use super::RegistryError;

#[derive(Debug, sqlx::FromRow)]
struct DbPlaylist {
    id: i64,
    external_id: String,
    external_url: Option<String>,
    name: String,
    last_synced: Option<NaiveDateTime>,
}

impl TryFrom<DbPlaylist> for Playlist {
    type Error = RegistryError;

    fn try_from(row: DbPlaylist) -> Result<Self, Self::Error> {
        Playlist::new(
            row.id,
            row.external_id,
            row.external_url,
            row.name,
            row.last_synced,
        )
        .map_err(RegistryError::from)
    }
}

pub struct SqlitePlaylistsRepository;

impl SqlitePlaylistsRepository {
    /// Creates the row if absent; otherwise updates name, URL, and last-sync timestamp.
    pub async fn upsert<'e, E>(
        executor: E,
        external_id: &str,
        external_url: Option<&str>,
        name: &str,
    ) -> Result<i64, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        let id = sqlx::query_scalar!(
            r#"
            INSERT INTO playlists (external_id, external_url, name, last_synced)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(external_id) DO UPDATE SET
                external_url = excluded.external_url,
                name = excluded.name,
                last_synced = excluded.last_synced
            RETURNING id
            "#,
            external_id,
            external_url,
            name,
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
    ) -> Result<Option<Playlist>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as!(
            DbPlaylist,
            r#"SELECT id, external_id, external_url, name, last_synced FROM playlists WHERE external_id = ?1"#,
            external_id
        )
        .fetch_optional(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        row.map(Playlist::try_from).transpose()
    }

    pub async fn all<'e, E>(executor: E) -> Result<Vec<Playlist>, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as!(
            DbPlaylist,
            r#"SELECT id, external_id, external_url, name, last_synced FROM playlists"#
        )
        .fetch_all(executor)
        .await
        .map_err(RegistryError::from_sqlx_error)?;

        rows.into_iter().map(Playlist::try_from).collect()
    }

    pub async fn delete<'e, E>(executor: E, external_id: &str) -> Result<bool, RegistryError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query!(r#"DELETE FROM playlists WHERE external_id = ?1"#, external_id)
            .execute(executor)
            .await
            .map_err(RegistryError::from_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
