use crate::entry::Entry;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Identity and metadata of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: String,
    pub content_type: Option<String>,
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            content_type: None,
            modified: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    #[must_use]
    pub const fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Extracts symbol entries from one file. One instance serves every file of
/// its languages and is called concurrently.
#[async_trait]
pub trait FileIndexer: Send + Sync {
    async fn index_file(&self, file: &FileInfo, build_flags: &[String]) -> Result<Vec<Entry>>;
}

/// Descriptor of an available indexer.
pub trait IndexerPlugin: Send + Sync {
    /// Stable identifier, e.g. `"python"`.
    fn id(&self) -> &str;

    /// Comma or semicolon separated language ids this plugin claims.
    fn languages(&self) -> &str;

    fn create(&self) -> Arc<dyn FileIndexer>;
}
