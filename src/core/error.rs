use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<toml::de::Error> for AutomationError {
    fn from(err: toml::de::Error) -> Self {
        AutomationError::ConfigError(err.to_string())
    }
}
