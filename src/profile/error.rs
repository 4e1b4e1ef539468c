use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::version::error::{CacheError, RegistryError};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to classify {name}: {source}")]
    Package {
        name: String,
        #[source]
        source: CacheError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid snapshot {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid package version {0:?}")]
    InvalidVersion(String),
}
