use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Store error: {0}")]
    StoreError(#[from] codeindex_store::StoreError),

    #[error("Indexer error: {0}")]
    IndexerError(#[from] codeindex_indexer::IndexerError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Index not found in {0}")]
    MissingIndex(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl SearchError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
            || matches!(self, Self::IndexerError(err) if err.is_cancelled())
    }
}
