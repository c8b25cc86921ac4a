use crate::entry::{fuzzy_key, Entry, KeyRecord, NameRecord};
use crate::error::{IndexerError, Result};
use crate::layout::{IndexLayout, N_FILES_KEY};
use crate::plan::PlanItem;
use crate::registry::Registry;
use codeindex_store::{FuzzyIndexBuilder, KeyMapBuilder};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of one directory build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Files that received an id, failed ones included.
    pub files: usize,
    pub failed_files: usize,
    pub keys: usize,
    pub names: usize,
}

/// Indexes the files of one directory and writes `SymbolKeys` and
/// `SymbolNames` into its index directory. Single use: [`run`](Self::run)
/// consumes the builder.
#[derive(Debug)]
pub struct DirectoryBuilder {
    source_dir: PathBuf,
    index_dir: PathBuf,
    items: Vec<PlanItem>,
}

impl DirectoryBuilder {
    pub fn new(source_dir: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            index_dir: index_dir.into(),
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, item: PlanItem) {
        self.items.push(item);
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
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index every queued file concurrently, then persist both structures.
    ///
    /// File ids follow submission order. A file whose indexer fails (or is
    /// unknown) keeps its id and path but contributes no symbols. Only
    /// persistence failures and cancellation fail the run.
    pub async fn run(self, registry: &Registry, token: &CancellationToken) -> Result<BuildStats> {
        let Self {
            source_dir,
            index_dir,
            items,
        } = self;

        let n_files = u32::try_from(items.len()).map_err(|_| {
            IndexerError::Other(format!("too many files in {}", source_dir.display()))
        })?;
        let mut stats = BuildStats {
            files: items.len(),
            ..BuildStats::default()
        };
        let mut names = FuzzyIndexBuilder::<NameRecord>::new();
        let mut tasks = JoinSet::new();

        for (file_id, item) in (0u32..).zip(items) {
            record_file(&mut names, file_id, item.path());

            let indexer = match registry.create_indexer(item.indexer_id()) {
                Ok(indexer) => indexer,
                Err(err) => {
                    log::debug!("{}: {err}", item.path().display());
                    stats.failed_files += 1;
                    continue;
                }
            };
            let file = item.shared_file();
            let flags = item.shared_build_flags();
            tasks.spawn(async move {
                let result = indexer
                    .index_file(&file, flags.as_deref().unwrap_or(&[]))
                    .await;
                (file_id, file, result)
            });
        }

        let mut indexed: Vec<(u32, Vec<Entry>)> = Vec::with_capacity(tasks.len());
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tasks.abort_all();
                    log::debug!("Build of {} cancelled", source_dir.display());
                    return Err(IndexerError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((file_id, _, Ok(entries)))) => indexed.push((file_id, entries)),
                    Some(Ok((_, file, Err(err)))) => {
                        log::debug!("Indexing {} failed: {err}", file.path.display());
                        stats.failed_files += 1;
                    }
                    Some(Err(err)) => {
                        log::debug!("Indexer task in {} died: {err}", source_dir.display());
                        stats.failed_files += 1;
                    }
                },
            }
        }

        // Aggregate in id order so duplicate keys resolve the same way every run.
        indexed.sort_by_key(|(file_id, _)| *file_id);
        let mut keys = KeyMapBuilder::<KeyRecord>::new();
        for (file_id, entries) in indexed {
            for entry in entries {
                let (keyed, named) = submit(&mut keys, &mut names, file_id, entry);
                stats.keys += usize::from(keyed);
                stats.names += usize::from(named);
            }
        }

        if token.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }
        persist(&index_dir, keys, names, n_files).await?;

        log::info!(
            "Indexed {}: {} files ({} failed), {} keys, {} names",
            source_dir.display(),
            stats.files,
            stats.failed_files,
            stats.keys,
            stats.names
        );
        Ok(stats)
    }
}

/// Both directions of the id <-> path table, stored as fuzzy-index metadata.
fn record_file(names: &mut FuzzyIndexBuilder<NameRecord>, file_id: u32, path: &Path) {
    let path = path.to_string_lossy();
    names.set_metadata_string(file_id.to_string(), &*path);
    names.set_metadata_u32(path.into_owned(), file_id);
}

fn submit(
    keys: &mut KeyMapBuilder<KeyRecord>,
    names: &mut FuzzyIndexBuilder<NameRecord>,
    file_id: u32,
    entry: Entry,
) -> (bool, bool) {
    let Entry {
        key,
        name,
        kind,
        flags,
        range,
    } = entry;
    let is_definition = flags.is_definition();

    let keyed = !key.is_empty();
    if keyed {
        let record = KeyRecord {
            file_id,
            line: range.line,
            column: range.column,
            flags,
        };
        keys.insert(key, record, is_definition);
    }

    let named = !name.is_empty();
    if named {
        let record = NameRecord {
            file_id,
            line: range.line,
            column: range.column,
            flags,
            kind,
        };
        names.insert(fuzzy_key(kind, &name), record, u32::from(is_definition));
    }
    (keyed, named)
}

/// Stage both files before replacing either, so a failed write leaves the
/// previous pair in place. Only a failed rename between the two commits can
/// split the pair; the fresh keys file is then removed so the next cull
/// rebuilds the directory.
async fn persist(
    index_dir: &Path,
    keys: KeyMapBuilder<KeyRecord>,
    mut names: FuzzyIndexBuilder<NameRecord>,
    n_files: u32,
) -> Result<()> {
    tokio::fs::create_dir_all(index_dir).await?;

    let keys_path = IndexLayout::keys_path(index_dir);
    let staged_keys = keys.stage(&keys_path).await?;

    names.set_metadata_u32(N_FILES_KEY, n_files);
    let staged_names = match names.stage(IndexLayout::names_path(index_dir)).await {
        Ok(staged) => staged,
        Err(err) => {
            staged_keys.discard().await;
            return Err(err.into());
        }
    };

    if let Err(err) = staged_keys.commit().await {
        staged_names.discard().await;
        return Err(err.into());
    }
    if let Err(err) = staged_names.commit().await {
        let _ = tokio::fs::remove_file(&keys_path).await;
        return Err(err.into());
    }
    Ok(())
}
