pub mod playlists_repo;
pub mod tracks_repo;
pub mod links_repo;
pub mod registry;

pub use playlists_repo::SqlitePlaylistsRepository;
pub use tracks_repo::SqliteCanonicalTracksRepository;
pub use links_repo::SqlitePlaylistTracksRepository;
pub use registry::Registry;

use crate::domain::ValidationError;

pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Playlist '{0}' was not found.")]
    PlaylistNotFound(String),

    #[error("Canonical track '{0}' was not found.")]
    TrackNotFound(String),

    #[error("Failed to decode a stored JSON column: {0}")]
    JsonDecoding(#[from] serde_json::Error),

    #[error("Failed to decode a stored timestamp: {0}")]
    TimestampDecoding(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("No rows were returned by a query that expected at least one row.")]
    RowNotFound,

    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Something went wrong talking to SQLite: {0}")]
    GenericDatabaseError(#[from] sqlx::Error),

    #[error("A constraint was violated: {description}")]
    ConstraintViolation { description: String },

    #[error("Failed to decode database row: {0}")]
    RowDecodingError(String),

    #[error(
        "Stored schema version {found} does not match the expected {expected}; refusing to open the registry."
    )]
    SchemaVersionMismatch { found: i64, expected: i64 },

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

impl RegistryError {
    pub fn from_sqlx_error(sqlx_error: sqlx::Error) -> Self {
        match &sqlx_error {
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                Self::ConnectionError(sqlx_error.to_string())
            }
            sqlx::Error::Decode(decode_err) => Self::RowDecodingError(decode_err.to_string()),
            sqlx::Error::Database(db_error) => {
                if let Some(error_code) = db_error.code() {
                    let code_str = error_code.as_ref();

                    // SQLite constraint-violation codes:
                    // 19 general, 2067 unique, 1555 primary key, 787 foreign key.
                    if ["19", "2067", "1555", "787"].contains(&code_str) {
                        return Self::ConstraintViolation {
                            description: db_error.message().to_string(),
                        };
                    }
                }

                Self::GenericDatabaseError(sqlx_error)
            }
            _ => Self::GenericDatabaseError(sqlx_error),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use sqlx::{Error as SqlxError, SqlitePool};

    pub async fn prepare_db() -> Result<SqlitePool, SqlxError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }
}
