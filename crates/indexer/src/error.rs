use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] codeindex_store::StoreError),

    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    GlobError(#[from] globset::Error),

    #[error("Ignore rules error: {0}")]
    IgnoreError(#[from] ignore::Error),

    #[error("Directory walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("Watcher error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid project path: {0}")]
    InvalidPath(String),

    #[error("No indexer registered with id '{0}'")]
    UnknownIndexer(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
