use crate::directory_index::DirectoryIndex;
use crate::error::{Result, SearchError};
use crate::merge::collect_top;
use crate::query::parse_query;
use crate::result::{Location, QueryResults, SearchResult, Symbol};
use codeindex_indexer::{display_name, DirectoryEvent, IndexLayout, SymbolKind};
use codeindex_store::FuzzyMatch;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What [`AggregateIndex::load`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// The files are not newer than the loaded copy.
    Unchanged,
}

/// Live union of every loaded [`DirectoryIndex`].
///
/// Directories keep the position they were first loaded at; a reload swaps
/// the `Arc` in that slot. The lock only guards the table, so queries run
/// against the snapshots they took and never block a reload.
#[derive(Clone, Default)]
pub struct AggregateIndex {
    table: Arc<Mutex<DirectoryTable>>,
}

#[derive(Default)]
struct DirectoryTable {
    directories: Vec<Arc<DirectoryIndex>>,
    positions: HashMap<PathBuf, usize>,
}

impl fmt::Debug for AggregateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateIndex")
            .field("directories", &self.directory_count())
            .finish()
    }
}

impl AggregateIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, DirectoryTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn directory_count(&self) -> usize {
        self.table().directories.len()
    }

    /// Snapshot of the loaded directories in position order.
    #[must_use]
    pub fn directories(&self) -> Vec<Arc<DirectoryIndex>> {
        self.table().directories.clone()
    }

    #[must_use]
    pub fn directory(&self, index_dir: &Path) -> Option<Arc<DirectoryIndex>> {
        let table = self.table();
        let position = *table.positions.get(index_dir)?;
        table.directories.get(position).cloned()
    }

    /// Load or reload the index persisted in `index_dir`.
    ///
    /// Returns `Unchanged` without reading anything when the backing files
    /// are not newer than the loaded copy. On failure the previously loaded
    /// copy, if any, stays in place.
    pub async fn load(
        &self,
        index_dir: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
    ) -> Result<LoadOutcome> {
        let index_dir = index_dir.into();
        if let Some(previous) = self.directory(&index_dir) {
            if let Some(current) = IndexLayout::index_mtime(&index_dir) {
                if current <= previous.mtime() {
                    debug!("Index of {} is current", previous.source_dir().display());
                    return Ok(LoadOutcome::Unchanged);
                }
            }
        }

        let directory = Arc::new(DirectoryIndex::load(index_dir, source_dir).await?);
        debug!(
            "Loaded index of {} ({} names)",
            directory.source_dir().display(),
            directory.names().len()
        );

        Ok(self.install(directory))
    }

    /// Put `directory` in its slot unless a concurrent load already installed
    /// a newer snapshot of the same index.
    fn install(&self, directory: Arc<DirectoryIndex>) -> LoadOutcome {
        let mut guard = self.table();
        let table = &mut *guard;
        match table.positions.get(directory.index_dir()).copied() {
            Some(position) => {
                if directory.mtime() < table.directories[position].mtime() {
                    debug!("Dropping stale load of {}", directory.source_dir().display());
                    return LoadOutcome::Unchanged;
                }
                table.directories[position] = directory;
            }
            None => {
                table
                    .positions
                    .insert(directory.index_dir().to_path_buf(), table.directories.len());
                table.directories.push(directory);
            }
        }
        LoadOutcome::Loaded
    }

    /// Load every index persisted under the layout's cache root. Directories
    /// that fail to load are logged and skipped. Returns how many loaded.
    pub async fn load_all(&self, layout: &IndexLayout) -> Result<usize> {
        let layout = layout.clone();
        let found = tokio::task::spawn_blocking(move || layout.persisted_directories()).await??;

        let mut loaded = 0;
        for (index_dir, source_dir) in found {
            match self.load(index_dir, source_dir.clone()).await {
                Ok(_) => loaded += 1,
                Err(err) => warn!("Skipping index of {}: {err}", source_dir.display()),
            }
        }
        info!("Loaded {loaded} directory indexes");
        Ok(loaded)
    }

    /// Fuzzy search across every directory.
    ///
    /// Directories are queried one after another; their sorted match streams
    /// are then merged by score. Variables are skipped and do not count
    /// against `max_results` (`0` = no cap). Each directory contributes at
    /// most `max_results + 1` hits, enough to tell whether more exist.
    pub async fn populate_query(
        &self,
        text: &str,
        max_results: usize,
        token: &CancellationToken,
    ) -> Result<QueryResults> {
        let directories = self.directories();
        if directories.is_empty() {
            return Ok(QueryResults::default());
        }

        let query = parse_query(text);
        let per_directory = if max_results == 0 { 0 } else { max_results + 1 };
        let mut streams = Vec::with_capacity(directories.len());
        for directory in &directories {
            let directory = Arc::clone(directory);
            let query = query.clone();
            let matches = tokio::select! {
                biased;
                () = token.cancelled() => return Err(SearchError::Cancelled),
                matches = tokio::task::spawn_blocking(move || {
                    directory.query_symbols(&query, per_directory)
                }) => matches?,
            };
            streams.push(matches);
        }

        let (results, truncated) = collect_top(streams, max_results, |position, hit| {
            resolve_hit(&directories[position], &hit)
        });
        debug!(
            "Query {text:?}: {} results across {} directories{}",
            results.len(),
            directories.len(),
            if truncated { " (truncated)" } else { "" }
        );
        Ok(QueryResults { results, truncated })
    }

    /// Resolve an exact symbol key. A definition anywhere wins over a
    /// declaration; among definitions the earliest loaded directory wins.
    #[must_use]
    pub fn lookup_symbol(&self, key: &str) -> Option<Symbol> {
        if key.is_empty() {
            return None;
        }

        let table = self.table();
        let mut declaration = None;
        for directory in &table.directories {
            let Some(record) = directory.lookup(key) else {
                continue;
            };
            let Some(path) = directory.path_of(record.file_id) else {
                debug!(
                    "No path for file {} in {}",
                    record.file_id,
                    directory.index_dir().display()
                );
                continue;
            };
            let location = Location::from_stored(path, record.line, record.column);

            if record.flags.is_definition() {
                return Some(Symbol {
                    key: key.to_string(),
                    flags: record.flags,
                    definition: Some(location),
                    declaration: None,
                });
            }
            if declaration.is_none() {
                declaration = Some((record.flags, location));
            }
        }

        declaration.map(|(flags, location)| Symbol {
            key: key.to_string(),
            flags,
            definition: None,
            declaration: Some(location),
        })
    }

    /// Reload every directory the executor reports as indexed, until the
    /// channel closes.
    pub fn follow(&self, mut events: broadcast::Receiver<DirectoryEvent>) -> JoinHandle<()> {
        let aggregate = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(DirectoryEvent::Indexed {
                        source_dir,
                        index_dir,
                        ..
                    }) => aggregate.reload(index_dir, source_dir).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {skipped} index updates, rechecking every directory");
                        for directory in aggregate.directories() {
                            aggregate
                                .reload(
                                    directory.index_dir().to_path_buf(),
                                    directory.source_dir().to_path_buf(),
                                )
                                .await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Index update follower stopped");
        })
    }

    async fn reload(&self, index_dir: PathBuf, source_dir: PathBuf) {
        if let Err(err) = self.load(index_dir, source_dir.clone()).await {
            warn!("Failed to reload index of {}: {err}", source_dir.display());
        }
    }
}

fn resolve_hit(directory: &DirectoryIndex, hit: &FuzzyMatch) -> Option<SearchResult> {
    let (key, record) = directory.names().get(hit)?;
    let Some(path) = directory.path_of(record.file_id) else {
        debug!(
            "No path for file {} in {}",
            record.file_id,
            directory.index_dir().display()
        );
        return None;
    };

    let path = PathBuf::from(path);
    let mut subtitle = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if record.kind == SymbolKind::Function && !record.flags.is_definition() {
        subtitle.push_str(" (Declaration)");
    }

    Some(SearchResult {
        title: display_name(key).to_string(),
        subtitle,
        icon_name: record.kind.icon_name(),
        kind: record.kind,
        location: Location::from_stored(path, record.line, record.column),
        score: hit.score,
    })
}
