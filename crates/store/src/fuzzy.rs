use crate::error::Result;
use crate::persist::{
    check_version, read_json, read_json_blocking, stage, StagedFile, FORMAT_VERSION,
};
use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher, Utf32Str};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FuzzyEntry<V> {
    key: String,
    value: V,
    #[serde(default)]
    aux_score: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Metadata {
    #[serde(default)]
    strings: BTreeMap<String, String>,
    #[serde(default)]
    uints: BTreeMap<String, u32>,
}

#[derive(Serialize)]
struct PersistedFuzzyIndexRef<'a, V> {
    format_version: u32,
    metadata: &'a Metadata,
    entries: &'a [FuzzyEntry<V>],
}

#[derive(Deserialize)]
struct PersistedFuzzyIndex<V> {
    format_version: u32,
    #[serde(default)]
    metadata: Metadata,
    entries: Vec<FuzzyEntry<V>>,
}

/// Accumulates fuzzy-searchable names and index-wide metadata.
#[derive(Debug)]
pub struct FuzzyIndexBuilder<V> {
    entries: Vec<FuzzyEntry<V>>,
    metadata: Metadata,
}

impl<V> Default for FuzzyIndexBuilder<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            metadata: Metadata::default(),
        }
    }
}

impl<V: Serialize> FuzzyIndexBuilder<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `aux_score` breaks ties between equally scored matches (higher first).
    pub fn insert(&mut self, name: impl Into<String>, value: V, aux_score: u32) {
        self.entries.push(FuzzyEntry {
            key: name.into(),
            value,
            aux_score,
        });
    }

    pub fn set_metadata_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.strings.insert(key.into(), value.into());
    }

    pub fn set_metadata_u32(&mut self, key: impl Into<String>, value: u32) {
        self.metadata.uints.insert(key.into(), value);
    }

    #[must_use]
    pub fn metadata_string(&self, key: &str) -> Option<&str> {
        self.metadata.strings.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn write(self, path: impl AsRef<Path>) -> Result<()> {
        self.stage(path).await?.commit().await
    }

    pub async fn stage(self, path: impl AsRef<Path>) -> Result<StagedFile> {
        let persisted = PersistedFuzzyIndexRef {
            format_version: FORMAT_VERSION,
            metadata: &self.metadata,
            entries: &self.entries,
        };
        stage(path.as_ref(), &persisted).await
    }
}

/// One scored hit. Resolve it with [`FuzzyIndex::get`] on the index that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch {
    pub index: usize,
    pub score: f32,
}

/// Hits of one query, best first.
#[derive(Debug)]
pub struct FuzzyMatches {
    inner: std::vec::IntoIter<FuzzyMatch>,
}

impl FuzzyMatches {
    fn empty() -> Self {
        Self {
            inner: Vec::new().into_iter(),
        }
    }
}

impl Iterator for FuzzyMatches {
    type Item = FuzzyMatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for FuzzyMatches {}

/// Read-only fuzzy name index loaded from disk.
#[derive(Debug)]
pub struct FuzzyIndex<V> {
    entries: Vec<FuzzyEntry<V>>,
    metadata: Metadata,
}

impl<V: DeserializeOwned> FuzzyIndex<V> {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let persisted: PersistedFuzzyIndex<V> = read_json(path.as_ref()).await?;
        Self::from_persisted(persisted)
    }

    /// Blocking variant of [`FuzzyIndex::load`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let persisted: PersistedFuzzyIndex<V> = read_json_blocking(path.as_ref())?;
        Self::from_persisted(persisted)
    }

    fn from_persisted(persisted: PersistedFuzzyIndex<V>) -> Result<Self> {
        check_version(persisted.format_version)?;
        Ok(Self {
            entries: persisted.entries,
            metadata: persisted.metadata,
        })
    }
}

impl<V> FuzzyIndex<V> {
    #[must_use]
    pub fn metadata_string(&self, key: &str) -> Option<&str> {
        self.metadata.strings.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn metadata_u32(&self, key: &str) -> Option<u32> {
        self.metadata.uints.get(key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, hit: &FuzzyMatch) -> Option<(&str, &V)> {
        self.entries
            .get(hit.index)
            .map(|entry| (entry.key.as_str(), &entry.value))
    }

    /// Score every name against `text` and return the hits best first.
    /// `max_results == 0` keeps every hit.
    #[must_use]
    pub fn query(&self, text: &str, max_results: usize) -> FuzzyMatches {
        self.query_where(text, max_results, |_| true)
    }

    /// Like [`query`](Self::query), restricted to entries whose value passes
    /// `keep`. Rejected entries are never scored and do not count against
    /// `max_results`. A capped query holds at most `2 * max_results` hits.
    #[allow(clippy::cast_precision_loss)]
    pub fn query_where(
        &self,
        text: &str,
        max_results: usize,
        mut keep: impl FnMut(&V) -> bool,
    ) -> FuzzyMatches {
        if text.trim().is_empty() {
            return FuzzyMatches::empty();
        }

        let pattern = Pattern::parse(text, CaseMatching::Smart, Normalization::Smart);
        let mut matcher = Matcher::new(Config::DEFAULT);
        let mut buf = Vec::new();
        let prune_at = max_results.saturating_mul(2);

        let mut hits = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            if !keep(&entry.value) {
                continue;
            }
            let haystack = Utf32Str::new(&entry.key, &mut buf);
            let Some(score) = pattern.score(haystack, &mut matcher) else {
                continue;
            };
            hits.push(FuzzyMatch {
                index,
                score: score as f32,
            });
            if max_results > 0 && hits.len() >= prune_at {
                hits.select_nth_unstable_by(max_results - 1, |a, b| self.rank(a, b));
                hits.truncate(max_results);
            }
        }

        hits.sort_by(|a, b| self.rank(a, b));
        if max_results > 0 {
            hits.truncate(max_results);
        }

        FuzzyMatches {
            inner: hits.into_iter(),
        }
    }

    /// Score, then aux score, then the shorter key, then key order.
    fn rank(&self, a: &FuzzyMatch, b: &FuzzyMatch) -> Ordering {
        let (ea, eb) = (&self.entries[a.index], &self.entries[b.index]);
        b.score
            .total_cmp(&a.score)
            .then_with(|| eb.aux_score.cmp(&ea.aux_score))
            .then_with(|| ea.key.len().cmp(&eb.key.len()))
            .then_with(|| ea.key.cmp(&eb.key))
            .then_with(|| a.index.cmp(&b.index))
    }
}
