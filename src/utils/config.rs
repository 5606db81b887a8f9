use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{env, fs};

use crate::services::DURATION_TOLERANCE_SECONDS;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read the config ({path}): {source}")]
    FailedToReadConfig { path: String, source: String },

    #[error("Failed to parse the config: {0}")]
    FailedToParseConfig(String),

    #[error("Missing required config key: {0}")]
    MissingKey(String),

    #[error("Invalid value at {path}: {reason}")]
    InvalidValue { path: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "catalogA")]
    catalog_a: Option<RawCatalogAConfig>,
    output: Option<RawOutputConfig>,
    acquisition: Option<RawAcquisitionConfig>,
}

#[derive(Debug, Deserialize)]
struct RawCatalogAConfig {
    #[serde(rename = "clientId")]
    client_id: Option<String>,
    #[serde(rename = "clientSecret")]
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOutputConfig {
    directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct RawAcquisitionConfig {
    workers: Option<usize>,
    #[serde(rename = "cookieFile")]
    cookie_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogAConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    pub workers: usize,
    pub cookie_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub catalog_a: CatalogAConfig,
    pub output: OutputConfig,
    pub acquisition: AcquisitionConfig,
}

const DEFAULT_ACQUISITION_WORKERS: usize = 4;

fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(path_str) = path.to_str().ok_or(()) else {
        return path.to_path_buf();
    };

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Ok(home) = env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }

    path.to_path_buf()
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("config.yaml"))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path).map_err(|err| ConfigError::FailedToReadConfig {
            path: path.display().to_string(),
            source: err.to_string(),
        })?;

        let raw: RawConfig =
            serde_yaml::from_str(&config_str).map_err(|err| ConfigError::FailedToParseConfig(err.to_string()))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let raw_catalog_a = raw
            .catalog_a
            .ok_or_else(|| ConfigError::MissingKey("catalogA".to_string()))?;
        let client_id = raw_catalog_a
            .client_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey("catalogA.clientId".to_string()))?;
        let client_secret = raw_catalog_a
            .client_secret
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey("catalogA.clientSecret".to_string()))?;

        let raw_output = raw
            .output
            .ok_or_else(|| ConfigError::MissingKey("output".to_string()))?;
        let directory = raw_output
            .directory
            .ok_or_else(|| ConfigError::MissingKey("output.directory".to_string()))?;
        let directory = expand_tilde(&directory);

        let raw_acquisition = raw.acquisition.unwrap_or_default();
        let workers = raw_acquisition.workers.unwrap_or(DEFAULT_ACQUISITION_WORKERS);
        if workers < 1 {
            return Err(ConfigError::InvalidValue {
                path: "acquisition.workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(cookie_file) = &raw_acquisition.cookie_file {
            if !cookie_file.exists() {
                return Err(ConfigError::InvalidValue {
                    path: "acquisition.cookieFile".to_string(),
                    reason: format!("{} does not exist", cookie_file.display()),
                });
            }
        }

        Ok(Config {
            catalog_a: CatalogAConfig {
                client_id,
                client_secret,
            },
            output: OutputConfig { directory },
            acquisition: AcquisitionConfig {
                workers,
                cookie_file: raw_acquisition.cookie_file,
            },
        })
    }

    pub fn duration_tolerance_seconds(&self) -> i64 {
        DURATION_TOLERANCE_SECONDS
    }
}

pub fn get_config() -> Result<&'static Config, ConfigError> {
    static CONFIG: OnceLock<Result<Config, ConfigError>> = OnceLock::new();

    let result = CONFIG.get_or_init(Config::load);

    match result {
        Ok(config) => Ok(config),
        Err(err) => Err(err.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn loads_a_complete_config() {
        let file = write_yaml(
            r#"
catalogA:
  clientId: abc
  clientSecret: xyz
output:
  directory: /tmp/library
acquisition:
  workers: 8
"#,
        );

        let config = Config::load_from(file.path()).expect("valid config");
        assert_eq!(config.catalog_a.client_id, "abc");
        assert_eq!(config.acquisition.workers, 8);
        assert_eq!(config.output.directory, PathBuf::from("/tmp/library"));
    }

    #[test]
    fn missing_required_key_reports_dotted_path() {
        let file = write_yaml(
            r#"
catalogA:
  clientId: abc
output:
  directory: /tmp/library
"#,
        );

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "catalogA.clientSecret"));
    }

    #[test]
    fn acquisition_defaults_to_four_workers() {
        let file = write_yaml(
            r#"
catalogA:
  clientId: abc
  clientSecret: xyz
output:
  directory: /tmp/library
"#,
        );

        let config = Config::load_from(file.path()).expect("valid config");
        assert_eq!(config.acquisition.workers, 4);
    }

    #[test]
    fn missing_cookie_file_is_rejected() {
        let file = write_yaml(
            r#"
catalogA:
  clientId: abc
  clientSecret: xyz
output:
  directory: /tmp/library
acquisition:
  cookieFile: /does/not/exist
"#,
        );

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref path, .. } if path == "acquisition.cookieFile"));
    }
}
