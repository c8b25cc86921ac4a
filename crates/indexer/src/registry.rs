use crate::error::{IndexerError, Result};
use crate::language::LanguageCatalog;
use crate::plugin::{FileIndexer, FileInfo, IndexerPlugin};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// File-matching rules of one indexer, resolved from its language ids.
#[derive(Debug, Clone)]
pub struct IndexerInfo {
    id: Arc<str>,
    languages: Vec<String>,
    globs: GlobSet,
    mime_types: HashSet<String>,
}

impl IndexerInfo {
    fn resolve(plugin: &dyn IndexerPlugin, catalog: &LanguageCatalog) -> Result<Self> {
        let languages: Vec<String> = plugin
            .languages()
            .split([',', ';'])
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .map(str::to_string)
            .collect();

        let mut globs = GlobSetBuilder::new();
        let mut mime_types = HashSet::new();
        for lang in &languages {
            let Some(def) = catalog.get(lang) else {
                log::debug!("Indexer '{}' claims unknown language '{lang}'", plugin.id());
                continue;
            };
            for pattern in &def.globs {
                globs.add(Glob::new(pattern)?);
            }
            mime_types.extend(def.mime_types.iter().cloned());
        }

        Ok(Self {
            id: Arc::from(plugin.id()),
            languages,
            globs: globs.build()?,
            mime_types,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn shared_id(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    #[must_use]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// MIME type membership first, then the file-name globs.
    #[must_use]
    pub fn matches(&self, file_name: &str, content_type: Option<&str>) -> bool {
        if content_type.is_some_and(|mime| self.mime_types.contains(mime)) {
            return true;
        }
        self.globs.is_match(file_name)
    }
}

/// Available indexers, built once and shared by `Arc` with every component
/// that plans or builds.
pub struct Registry {
    catalog: LanguageCatalog,
    indexers: Vec<IndexerInfo>,
    plugins: HashMap<String, Arc<dyn IndexerPlugin>>,
    instances: Mutex<HashMap<String, Arc<dyn FileIndexer>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("indexers", &self.indexers)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(plugins: Vec<Arc<dyn IndexerPlugin>>, catalog: LanguageCatalog) -> Result<Self> {
        let mut indexers = Vec::with_capacity(plugins.len());
        let mut by_id = HashMap::with_capacity(plugins.len());
        for plugin in plugins {
            if by_id.contains_key(plugin.id()) {
                log::warn!("Duplicate indexer id '{}' ignored", plugin.id());
                continue;
            }
            indexers.push(IndexerInfo::resolve(plugin.as_ref(), &catalog)?);
            by_id.insert(plugin.id().to_string(), plugin);
        }
        log::debug!("Registry built with {} indexers", indexers.len());

        Ok(Self {
            catalog,
            indexers,
            plugins: by_id,
            instances: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn catalog(&self) -> &LanguageCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn indexers(&self) -> &[IndexerInfo] {
        &self.indexers
    }

    /// First indexer (in plugin order) that claims `file`.
    #[must_use]
    pub fn indexer_for(&self, file: &FileInfo) -> Option<&IndexerInfo> {
        self.indexers
            .iter()
            .find(|info| info.matches(&file.name, file.content_type.as_deref()))
    }

    /// Stat `path` and guess its content type. `None` if it cannot be read.
    #[must_use]
    pub fn describe_file(&self, path: &Path) -> Option<FileInfo> {
        let metadata = std::fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(
            FileInfo::new(path)
                .with_content_type(self.catalog.content_type_for(path))
                .with_modified(metadata.modified().ok()),
        )
    }

    /// True when some indexer would handle `path`.
    #[must_use]
    pub fn recognizes(&self, path: &Path) -> bool {
        let info = FileInfo::new(path).with_content_type(self.catalog.content_type_for(path));
        self.indexer_for(&info).is_some()
    }

    /// Shared indexer instance for `id`, created on first use.
    pub fn create_indexer(&self, id: &str) -> Result<Arc<dyn FileIndexer>> {
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(instance) = instances.get(id) {
            return Ok(Arc::clone(instance));
        }
        let plugin = self
            .plugins
            .get(id)
            .ok_or_else(|| IndexerError::UnknownIndexer(id.to_string()))?;
        let instance = plugin.create();
        instances.insert(id.to_string(), Arc::clone(&instance));
        Ok(instance)
    }
}
