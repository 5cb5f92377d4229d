use std::path::PathBuf;
use thiserror::Error;

use crate::analyzer::kubecuro::config::ConfigError;
use crate::analyzer::kubecuro::deprecation::DeprecationTableError;

/// Run-level failures. Anything that only affects one file is a finding instead.
#[derive(Error, Debug)]
pub enum KubecuroError {
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Deprecation table error: {0}")]
    DeprecationTable(#[from] DeprecationTableError),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown finding code '{0}'")]
    UnknownCode(String),
}

pub type Result<T> = std::result::Result<T, KubecuroError>;
