use crate::error::{Result, SearchError};
use codeindex_indexer::{IndexLayout, KeyRecord, NameRecord, SymbolKind};
use codeindex_store::{FuzzyIndex, FuzzyMatches, KeyMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// The loaded pair of persisted structures for one source directory.
///
/// Immutable once loaded; a reload builds a new value.
#[derive(Debug)]
pub struct DirectoryIndex {
    source_dir: PathBuf,
    index_dir: PathBuf,
    mtime: SystemTime,
    names: FuzzyIndex<NameRecord>,
    keys: KeyMap<KeyRecord>,
}

impl DirectoryIndex {
    /// Load both files of `index_dir`. Their newest modification time is
    /// taken before reading, so a write racing the load triggers another
    /// reload later.
    pub async fn load(
        index_dir: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let index_dir = index_dir.into();
        let mtime = IndexLayout::index_mtime(&index_dir)
            .ok_or_else(|| SearchError::MissingIndex(index_dir.display().to_string()))?;

        let (names, keys) = tokio::try_join!(
            FuzzyIndex::<NameRecord>::load(IndexLayout::names_path(&index_dir)),
            KeyMap::<KeyRecord>::load(IndexLayout::keys_path(&index_dir)),
        )?;

        Ok(Self {
            source_dir: source_dir.into(),
            index_dir,
            mtime,
            names,
            keys,
        })
    }

    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    #[must_use]
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    #[must_use]
    pub const fn mtime(&self) -> SystemTime {
        self.mtime
    }

    #[must_use]
    pub const fn names(&self) -> &FuzzyIndex<NameRecord> {
        &self.names
    }

    #[must_use]
    pub fn query(&self, text: &str, max_results: usize) -> FuzzyMatches {
        self.names.query(text, max_results)
    }

    /// Fuzzy matches that can be shown as search results: variables are
    /// skipped before scoring and do not count against `max_results`.
    #[must_use]
    pub fn query_symbols(&self, text: &str, max_results: usize) -> FuzzyMatches {
        self.names
            .query_where(text, max_results, |record| record.kind != SymbolKind::Variable)
    }

    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&KeyRecord> {
        self.keys.lookup(key)
    }

    /// Absolute path of `file_id`, from the reverse table in the name index.
    #[must_use]
    pub fn path_of(&self, file_id: u32) -> Option<&str> {
        self.names.metadata_string(&file_id.to_string())
    }
}
