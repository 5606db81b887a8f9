use std::sync::Arc;

use anyhow::{anyhow, Error};
use tokio::sync::OnceCell;

use crate::repository::Registry;
use crate::utils::config::get_config;

/// Process-wide `Registry` handle, opened lazily against the configured
/// output directory's `database.db` (§6 persisted state layout).
pub async fn get_registry() -> Result<Arc<Registry>, Error> {
    static REGISTRY: OnceCell<Result<Arc<Registry>, String>> = OnceCell::const_new();

    let result = REGISTRY
        .get_or_init(|| async {
            let config = match get_config() {
                Ok(config) => config,
                Err(err) => return Err(err.to_string()),
            };

            if let Err(err) = std::fs::create_dir_all(&config.output.directory) {
                return Err(err.to_string());
            }

            let db_path = config.output.directory.join("database.db");
            let db_path = match db_path.to_str() {
                Some(path) => path.to_string(),
                None => return Err("output directory path is not valid UTF-8".to_string()),
            };

            let db_url = format!("sqlite:{db_path}?mode=rwc");

            Registry::open(&db_url).await.map(Arc::new).map_err(|e| e.to_string())
        })
        .await;

    match result {
        Ok(registry) => Ok(Arc::clone(registry)),
        Err(msg) => Err(anyhow!("{}", msg)),
    }
}
