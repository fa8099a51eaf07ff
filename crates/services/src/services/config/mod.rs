use std::path::Path;

use thiserror::Error;

mod schema;

pub use schema::{BoardConfig, RemoteConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Will always return config, falling back to defaults on missing/invalid files.
pub async fn load_config_from_file(config_path: &Path) -> BoardConfig {
    match tokio::fs::read_to_string(config_path).await {
        Ok(raw_config) => BoardConfig::from_raw(&raw_config),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                tracing::info!("No config file at {}, using defaults", config_path.display());
            } else {
                tracing::warn!("Failed to read config file: {}", err);
            }
            BoardConfig::default()
        }
    }
}

/// Saves the config to the given path
pub async fn save_config_to_file(
    config: &BoardConfig,
    config_path: &Path,
) -> Result<(), ConfigError> {
    let normalized = config.clone().normalized();
    let raw_config = serde_json::to_string_pretty(&normalized)?;
    tokio::fs::write(config_path, raw_config).await?;
    Ok(())
}
