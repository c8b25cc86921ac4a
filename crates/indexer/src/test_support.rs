use crate::entry::{Entry, EntryFlags, SymbolKind};
use crate::error::{IndexerError, Result};
use crate::language::LanguageCatalog;
use crate::plugin::{FileIndexer, FileInfo, IndexerPlugin};
use crate::registry::Registry;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Emits one definition per non-empty line, named after the line text.
/// Files whose name contains `fail` are reported as failures.
pub struct LineIndexer;

#[async_trait]
impl FileIndexer for LineIndexer {
    async fn index_file(&self, file: &FileInfo, _flags: &[String]) -> Result<Vec<Entry>> {
        if file.name.contains("fail") {
            return Err(IndexerError::Other(format!("cannot index {}", file.name)));
        }
        let text = tokio::fs::read_to_string(&file.path).await?;
        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                let name = line.trim();
                Entry::new(name, SymbolKind::Function)
                    .with_key(format!("{stem}::{name}"))
                    .with_flags(EntryFlags::IS_DEFINITION)
                    .at(u32::try_from(idx + 1).unwrap_or(u32::MAX), 1)
            })
            .collect())
    }
}

pub struct TestPlugin {
    pub id: &'static str,
    pub languages: &'static str,
    pub indexer: Arc<dyn FileIndexer>,
}

impl IndexerPlugin for TestPlugin {
    fn id(&self) -> &str {
        self.id
    }

    fn languages(&self) -> &str {
        self.languages
    }

    fn create(&self) -> Arc<dyn FileIndexer> {
        Arc::clone(&self.indexer)
    }
}

pub fn python_registry() -> Arc<Registry> {
    let plugin: Arc<dyn IndexerPlugin> = Arc::new(TestPlugin {
        id: "py",
        languages: "python",
        indexer: Arc::new(LineIndexer),
    });
    Arc::new(Registry::new(vec![plugin], LanguageCatalog::builtin().unwrap()).unwrap())
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
