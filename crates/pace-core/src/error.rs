use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaceError {
    #[error("corrupt feature list at {}: {source}", path.display())]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("feature not found: {0}")]
    FeatureNotFound(String),

    #[error("unsafe path rejected: {0}")]
    UnsafePath(String),

    #[error("archive failed: {0}")]
    ArchiveFailed(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PaceError>;
