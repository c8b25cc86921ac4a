use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported index format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Invalid index path: {0}")]
    InvalidPath(String),
}

impl StoreError {
    /// True when the failure only means "the file is not there".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::IoError(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}
