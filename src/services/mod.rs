pub mod acquirer;
pub mod embedder;
pub mod file_manager;
pub mod lyrics;
pub mod matcher;
pub mod orchestrator;

use crate::catalog::{CatalogAError, CatalogBError};
use crate::domain::ValidationError;
use crate::repository::RegistryError;
use crate::utils::config::ConfigError;

/// Duration tolerance for catalog-B candidate filtering (§4.5 step 4).
pub const DURATION_TOLERANCE_SECONDS: i64 = 3;

/// Score-gap window under which a non-selected candidate is reported as a
/// close alternative (§4.5 step 7).
pub const CLOSE_MATCH_THRESHOLD: f64 = 5.0;

/// Minimum score a candidate must clear to be matchable at all (§4.5 step 6).
pub const MATCH_ACCEPTANCE_FLOOR: f64 = 50.0;

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("canonical file already exists at {0}, nothing to acquire")]
    AlreadyAcquired(String),

    #[error("extractor process failed: {0}")]
    ExtractorFailed(String),

    #[error("extractor produced no recognizable audio output in {0}")]
    NoOutputProduced(String),

    #[error(transparent)]
    FileManager(#[from] file_manager::FileManagerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum LyricsError {
    #[error("no lyrics provider returned a result for '{0}'")]
    AllProvidersFailed(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("failed to open audio file at {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: lofty::error::LoftyError,
    },

    #[error("failed to save tags to {path}: {source}")]
    SaveFailed {
        path: String,
        #[source]
        source: lofty::error::LoftyError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error surface the CLI matches on to compute the process exit
/// code (§6 CLI exit codes: 0 ok, 1 config, 2 registry, 3 catalog-A, 4 other).
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    CatalogA(#[from] CatalogAError),

    #[error(transparent)]
    CatalogB(#[from] CatalogBError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Lyrics(#[from] LyricsError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    FileManager(#[from] file_manager::FileManagerError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("phase 1 requires a scope (single playlist, LIKED, or sync-all)")]
    MissingScope,
}

impl OrchestratorError {
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestratorError::Config(_) => 1,
            OrchestratorError::Registry(_) => 2,
            OrchestratorError::CatalogA(_) => 3,
            _ => 4,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::OnceLock;

    use log::SetLoggerError;
    use sqlx::{Error as SqlxError, SqlitePool};

    #[derive(Debug, thiserror::Error)]
    pub enum TestSetupError {
        #[error("Failed to init env logger for tests: {0}")]
        LoggerError(String),

        #[error("I/O error: {0}")]
        IOError(#[from] std::io::Error),

        #[error(transparent)]
        Sqlx(#[from] SqlxError),
    }

    pub async fn prepare_db() -> Result<SqlitePool, SqlxError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    pub fn init_logger() -> Result<(), TestSetupError> {
        static LOGGER_RESULT: OnceLock<Result<(), SetLoggerError>> = OnceLock::new();

        let init_result_ref = LOGGER_RESULT.get_or_init(|| {
            env_logger::builder()
                .is_test(true)
                .filter_level(log::LevelFilter::Warn)
                .try_init()
        });

        match init_result_ref {
            Ok(_) => Ok(()),
            Err(e) => Err(TestSetupError::LoggerError(e.to_string())),
        }
    }
}
