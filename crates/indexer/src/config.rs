use crate::error::Result;
use crate::language::{LanguageCatalog, LanguageDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project directory holding configuration and the default cache.
pub const PROJECT_DIR_NAME: &str = ".codeindex";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CACHE_DIR_ENV: &str = "CODEINDEX_CACHE_DIR";

const fn default_debounce_ms() -> u64 {
    500
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_skip_suffixes() -> Vec<String> {
    vec![".in".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IndexerConfig {
    /// Cache root; `<project>/.codeindex/cache` when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// File-name suffixes that are never planned (build-system templates).
    #[serde(default = "default_skip_suffixes")]
    pub skip_suffixes: Vec<String>,

    #[serde(default)]
    pub languages: Vec<LanguageDefinition>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            skip_suffixes: default_skip_suffixes(),
            languages: Vec::new(),
        }
    }
}

impl IndexerConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `<project>/.codeindex/config.toml` if it exists, then apply the
    /// `CODEINDEX_CACHE_DIR` override.
    pub async fn load_for_project(project_root: &Path) -> Result<Self> {
        let path = project_root.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME);
        let mut config = match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                log::debug!("Loaded indexer config from {}", path.display());
                Self::from_toml(&text)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => return Err(err.into()),
        };

        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    /// Absolute cache root for `project_root`.
    #[must_use]
    pub fn cache_root(&self, project_root: &Path) -> PathBuf {
        match &self.cache_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_root.join(dir),
            None => project_root.join(PROJECT_DIR_NAME).join("cache"),
        }
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Built-in language catalog with the configured definitions merged in.
    pub fn language_catalog(&self) -> Result<LanguageCatalog> {
        LanguageCatalog::with_overrides(&self.languages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_yields_defaults() {
        let config = IndexerConfig::from_toml("").unwrap();
        assert_eq!(config, IndexerConfig::default());
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.skip_suffixes, vec![".in".to_string()]);
    }

    #[test]
    fn parses_languages_and_relative_cache_dir() {
        let config = IndexerConfig::from_toml(
            r#"
            cache_dir = "build/index-cache"
            debounce_ms = 50

            [[languages]]
            id = "vala"
            globs = ["*.vala", "*.vapi"]
            mime_types = ["text/x-vala"]
            "#,
        )
        .unwrap();

        assert_eq!(config.debounce_ms, 50);
        assert_eq!(
            config.cache_root(Path::new("/work/proj")),
            PathBuf::from("/work/proj/build/index-cache")
        );
        let catalog = config.language_catalog().unwrap();
        assert_eq!(
            catalog.content_type_for(Path::new("x.vala")).as_deref(),
            Some("text/x-vala")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(IndexerConfig::from_toml("debounce = 3").is_err());
    }

    #[test]
    fn default_cache_root_lives_under_project_dir() {
        let config = IndexerConfig::default();
        assert_eq!(
            config.cache_root(Path::new("/p")),
            PathBuf::from("/p/.codeindex/cache")
        );
    }
}
