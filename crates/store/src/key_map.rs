use crate::error::Result;
use crate::persist::{
    check_version, read_json, read_json_blocking, stage, StagedFile, FORMAT_VERSION,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyEntry<V> {
    key: String,
    value: V,
    #[serde(default)]
    preferred: bool,
}

#[derive(Serialize)]
struct PersistedKeyMapRef<'a, V> {
    format_version: u32,
    entries: &'a [KeyEntry<V>],
}

#[derive(Deserialize)]
struct PersistedKeyMap<V> {
    format_version: u32,
    entries: Vec<KeyEntry<V>>,
}

/// Accumulates exact-key records before they are written as one sorted map.
#[derive(Debug)]
pub struct KeyMapBuilder<V> {
    entries: Vec<KeyEntry<V>>,
}

impl<V> Default for KeyMapBuilder<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V: Serialize> KeyMapBuilder<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` under `key`. When the same key is inserted more than once,
    /// a preferred record wins over a non-preferred one; among equals the
    /// first insertion wins.
    pub fn insert(&mut self, key: impl Into<String>, value: V, preferred: bool) {
        self.entries.push(KeyEntry {
            key: key.into(),
            value,
            preferred,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn finish(mut self) -> Vec<KeyEntry<V>> {
        // Stable sort: insertion order survives among records with equal keys.
        self.entries
            .sort_by(|a, b| a.key.cmp(&b.key).then_with(|| b.preferred.cmp(&a.preferred)));
        self.entries.dedup_by(|later, kept| later.key == kept.key);
        self.entries
    }

    /// Sort, collapse duplicate keys and write the map to `path`.
    pub async fn write(self, path: impl AsRef<Path>) -> Result<()> {
        self.stage(path).await?.commit().await
    }

    /// Like [`write`](Self::write), but stops before replacing `path`.
    pub async fn stage(self, path: impl AsRef<Path>) -> Result<StagedFile> {
        let entries = self.finish();
        let persisted = PersistedKeyMapRef {
            format_version: FORMAT_VERSION,
            entries: &entries,
        };
        stage(path.as_ref(), &persisted).await
    }
}

/// Read-only exact-key map loaded from disk.
#[derive(Debug)]
pub struct KeyMap<V> {
    entries: Vec<KeyEntry<V>>,
}

impl<V: DeserializeOwned> KeyMap<V> {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let persisted: PersistedKeyMap<V> = read_json(path.as_ref()).await?;
        Self::from_persisted(persisted)
    }

    /// Blocking variant of [`KeyMap::load`] for callers already off the runtime.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let persisted: PersistedKeyMap<V> = read_json_blocking(path.as_ref())?;
        Self::from_persisted(persisted)
    }

    fn from_persisted(persisted: PersistedKeyMap<V>) -> Result<Self> {
        check_version(persisted.format_version)?;
        let mut entries = persisted.entries;
        if !entries.windows(2).all(|pair| pair[0].key < pair[1].key) {
            log::warn!("Key map entries out of order; re-sorting");
            entries.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| b.preferred.cmp(&a.preferred)));
            entries.dedup_by(|later, kept| later.key == kept.key);
        }
        Ok(Self { entries })
    }
}

impl<V> KeyMap<V> {
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&V> {
        self.entries
            .binary_search_by(|entry| entry.key.as_str().cmp(key))
            .ok()
            .map(|idx| &self.entries[idx].value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
