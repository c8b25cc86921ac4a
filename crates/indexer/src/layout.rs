use crate::error::{IndexerError, Result};
use codeindex_store::newest_mtime;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Exact-key map file inside a directory's index mirror.
pub const SYMBOL_KEYS: &str = "SymbolKeys";
/// Fuzzy name index file inside a directory's index mirror.
pub const SYMBOL_NAMES: &str = "SymbolNames";
/// Fuzzy-index metadata key holding the number of files indexed.
pub const N_FILES_KEY: &str = "n_files";

const CODE_INDEX_DIR: &str = "code-index";

/// Maps source directories to their cache-side index mirrors:
/// `<cache_root>/code-index/<path relative to project_root>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    project_root: PathBuf,
    cache_root: PathBuf,
}

impl IndexLayout {
    pub fn new(project_root: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            cache_root: cache_root.into(),
        }
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[must_use]
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    fn index_root(&self) -> PathBuf {
        self.cache_root.join(CODE_INDEX_DIR)
    }

    pub fn index_dir_for(&self, source_dir: &Path) -> Result<PathBuf> {
        let relative = source_dir.strip_prefix(&self.project_root).map_err(|_| {
            IndexerError::InvalidPath(format!(
                "{} is outside project {}",
                source_dir.display(),
                self.project_root.display()
            ))
        })?;
        Ok(self.index_root().join(relative))
    }

    #[must_use]
    pub fn keys_path(index_dir: &Path) -> PathBuf {
        index_dir.join(SYMBOL_KEYS)
    }

    #[must_use]
    pub fn names_path(index_dir: &Path) -> PathBuf {
        index_dir.join(SYMBOL_NAMES)
    }

    /// True when at least one of the two backing files exists.
    #[must_use]
    pub fn has_index(index_dir: &Path) -> bool {
        Self::keys_path(index_dir).exists() || Self::names_path(index_dir).exists()
    }

    /// Newest mtime of the two backing files, `None` unless both exist.
    #[must_use]
    pub fn index_mtime(index_dir: &Path) -> Option<SystemTime> {
        newest_mtime(&[Self::keys_path(index_dir), Self::names_path(index_dir)])
    }

    /// Best-effort removal of both backing files. Returns how many were deleted.
    pub async fn remove_index(index_dir: &Path) -> usize {
        let mut removed = 0;
        for path in [Self::keys_path(index_dir), Self::names_path(index_dir)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => log::debug!("Could not remove {}: {err}", path.display()),
            }
        }
        removed
    }

    /// Every `(index_dir, source_dir)` pair with a persisted fuzzy index under
    /// the cache root, in path order. Blocking.
    pub fn persisted_directories(&self) -> Result<Vec<(PathBuf, PathBuf)>> {
        let root = self.index_root();
        let mut found = Vec::new();
        if !root.is_dir() {
            return Ok(found);
        }

        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_dir() || !entry.path().join(SYMBOL_NAMES).is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or_else(|_| Path::new(""));
            found.push((entry.path().to_path_buf(), self.project_root.join(relative)));
        }

        found.sort();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn mirrors_relative_paths() {
        let layout = IndexLayout::new("/p", "/p/.codeindex/cache");
        assert_eq!(
            layout.index_dir_for(Path::new("/p/src/net")).unwrap(),
            PathBuf::from("/p/.codeindex/cache/code-index/src/net")
        );
        assert_eq!(
            layout.index_dir_for(Path::new("/p")).unwrap(),
            PathBuf::from("/p/.codeindex/cache/code-index")
        );
        assert!(layout.index_dir_for(Path::new("/elsewhere")).is_err());
    }

    #[tokio::test]
    async fn lists_and_removes_persisted_directories() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("proj");
        let layout = IndexLayout::new(&project, tmp.path().join("cache"));

        let index_dir = layout.index_dir_for(&project.join("src")).unwrap();
        std::fs::create_dir_all(&index_dir).unwrap();
        std::fs::write(IndexLayout::keys_path(&index_dir), b"{}").unwrap();
        assert!(IndexLayout::has_index(&index_dir));
        assert!(IndexLayout::index_mtime(&index_dir).is_none());

        std::fs::write(IndexLayout::names_path(&index_dir), b"{}").unwrap();
        assert!(IndexLayout::index_mtime(&index_dir).is_some());
        assert_eq!(
            layout.persisted_directories().unwrap(),
            vec![(index_dir.clone(), project.join("src"))]
        );

        assert_eq!(IndexLayout::remove_index(&index_dir).await, 2);
        assert!(!IndexLayout::has_index(&index_dir));
        assert_eq!(IndexLayout::remove_index(&index_dir).await, 0);
    }
}
