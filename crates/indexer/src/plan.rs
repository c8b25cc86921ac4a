use crate::build_flags::BuildSystem;
use crate::entry::NameRecord;
use crate::error::{IndexerError, Result};
use crate::layout::{IndexLayout, N_FILES_KEY};
use crate::plugin::FileInfo;
use crate::registry::Registry;
use crate::vcs::Vcs;
use codeindex_store::FuzzyIndex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// Why a directory is in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// No index exists yet.
    Initial,
    /// A planned file is newer than the index.
    Expired,
    /// The set of files differs from the indexed one.
    Changed,
    /// Every file is gone but an index remains.
    RemoveIndex,
}

impl Reason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Expired => "expired",
            Self::Changed => "changed",
            Self::RemoveIndex => "remove",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file queued for indexing. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanItem {
    file: Arc<FileInfo>,
    indexer_id: Arc<str>,
    build_flags: Option<Arc<[String]>>,
}

impl PlanItem {
    pub fn new(file: FileInfo, indexer_id: impl Into<Arc<str>>) -> Self {
        Self {
            file: Arc::new(file),
            indexer_id: indexer_id.into(),
            build_flags: None,
        }
    }

    #[must_use]
    pub fn file(&self) -> &FileInfo {
        &self.file
    }

    #[must_use]
    pub fn shared_file(&self) -> Arc<FileInfo> {
        Arc::clone(&self.file)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    #[must_use]
    pub fn indexer_id(&self) -> &str {
        &self.indexer_id
    }

    /// Attached compiler flags; empty when none are known.
    #[must_use]
    pub fn build_flags(&self) -> &[String] {
        self.build_flags.as_deref().unwrap_or(&[])
    }

    #[must_use]
    pub fn shared_build_flags(&self) -> Option<Arc<[String]>> {
        self.build_flags.clone()
    }

    #[must_use]
    pub fn with_build_flags(mut self, flags: Vec<String>) -> Self {
        self.build_flags = Some(Arc::from(flags));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPlan {
    pub items: Vec<PlanItem>,
    pub reason: Reason,
}

/// Result of a [`Plan::foreach`] visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Remove,
}

/// Count of planned directories per [`Reason`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub initial: usize,
    pub expired: usize,
    pub changed: usize,
    pub remove: usize,
    pub files: usize,
}

impl PlanSummary {
    #[must_use]
    pub const fn directories(&self) -> usize {
        self.initial + self.expired + self.changed + self.remove
    }
}

/// Collaborators needed to populate a plan.
#[derive(Clone)]
pub struct PlanContext {
    pub registry: Arc<Registry>,
    pub vcs: Arc<dyn Vcs>,
    pub layout: IndexLayout,
    pub skip_suffixes: Vec<String>,
}

impl PlanContext {
    pub fn new(registry: Arc<Registry>, vcs: Arc<dyn Vcs>, layout: IndexLayout) -> Self {
        Self {
            registry,
            vcs,
            layout,
            skip_suffixes: vec![".in".to_string()],
        }
    }

    #[must_use]
    pub fn with_skip_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.skip_suffixes = suffixes;
        self
    }

    fn is_skipped(&self, file_name: &str) -> bool {
        self.skip_suffixes
            .iter()
            .any(|suffix| file_name.ends_with(suffix.as_str()))
    }
}

type DirectoryMap = BTreeMap<PathBuf, DirectoryPlan>;

/// Directories that need (re)indexing, each at most once.
///
/// Every mutation holds the internal lock for a single map operation; no
/// file-system call happens under it.
#[derive(Debug, Default)]
pub struct Plan {
    dirs: Arc<Mutex<DirectoryMap>>,
}

impl Plan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryMap> {
        lock_map(&self.dirs)
    }

    /// Queue `items` for `dir` as [`Reason::Initial`], replacing any previous entry.
    pub fn insert(&self, dir: impl Into<PathBuf>, items: Vec<PlanItem>) {
        let plan = DirectoryPlan {
            items,
            reason: Reason::Initial,
        };
        self.lock().insert(dir.into(), plan);
    }

    /// Drop `dir` from the plan. Returns whether it was planned.
    pub fn remove(&self, dir: &Path) -> bool {
        self.lock().remove(dir).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn reason_of(&self, dir: &Path) -> Option<Reason> {
        self.lock().get(dir).map(|plan| plan.reason)
    }

    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        let dirs = self.lock();
        let mut summary = PlanSummary::default();
        for plan in dirs.values() {
            summary.files += plan.items.len();
            match plan.reason {
                Reason::Initial => summary.initial += 1,
                Reason::Expired => summary.expired += 1,
                Reason::Changed => summary.changed += 1,
                Reason::RemoveIndex => summary.remove += 1,
            }
        }
        summary
    }

    /// Walk `workdir` (breadth first, only `workdir` itself unless `recursive`)
    /// and plan every directory holding at least one indexable file.
    ///
    /// Directories are inserted as soon as they are listed, so a concurrent
    /// reader sees the plan grow. A directory without indexable files is only
    /// planned (empty) when an index for it already exists, so that culling can
    /// schedule its removal.
    pub async fn populate(
        &self,
        ctx: &PlanContext,
        workdir: &Path,
        recursive: bool,
        token: &CancellationToken,
    ) -> Result<()> {
        let dirs = Arc::clone(&self.dirs);
        let ctx = ctx.clone();
        let workdir = workdir.to_path_buf();
        let token = token.clone();

        let planned =
            tokio::task::spawn_blocking(move || walk(&ctx, &workdir, recursive, &token, &dirs))
                .await??;
        log::info!("Plan populated with {planned} directories");
        Ok(())
    }

    /// Drop directories whose index is current and classify the rest.
    ///
    /// On cancellation the plan is left as it was and `Cancelled` is returned;
    /// callers must not proceed to execution.
    pub async fn cull(&self, layout: &IndexLayout, token: &CancellationToken) -> Result<()> {
        let snapshot: Vec<(PathBuf, Vec<PlanItem>)> = self
            .lock()
            .iter()
            .map(|(dir, plan)| (dir.clone(), plan.items.clone()))
            .collect();
        if snapshot.is_empty() {
            return Ok(());
        }

        let layout = layout.clone();
        let token = token.clone();
        let verdicts = tokio::task::spawn_blocking(move || {
            let mut verdicts = Vec::with_capacity(snapshot.len());
            for (dir, items) in snapshot {
                if token.is_cancelled() {
                    return Err(IndexerError::Cancelled);
                }
                let verdict = match layout.index_dir_for(&dir) {
                    Ok(index_dir) => classify(&index_dir, &items),
                    Err(err) => {
                        log::warn!("Skipping {}: {err}", dir.display());
                        None
                    }
                };
                verdicts.push((dir, verdict));
            }
            Ok(verdicts)
        })
        .await??;

        let mut dirs = self.lock();
        let mut dropped = 0usize;
        for (dir, verdict) in verdicts {
            match verdict {
                Some(reason) => {
                    if let Some(plan) = dirs.get_mut(&dir) {
                        plan.reason = reason;
                    }
                }
                None => {
                    if dirs.remove(&dir).is_some() {
                        dropped += 1;
                    }
                }
            }
        }
        log::info!(
            "Plan culled: {dropped} directories up to date, {} remaining",
            dirs.len()
        );
        Ok(())
    }

    /// Ask `build_system` once for flags of every planned file and attach them.
    pub async fn load_flags(&self, build_system: &dyn BuildSystem) -> Result<()> {
        let files: Vec<PathBuf> = self
            .lock()
            .values()
            .flat_map(|plan| plan.items.iter().map(|item| item.path().to_path_buf()))
            .collect();
        if files.is_empty() {
            return Ok(());
        }

        let mut flags = build_system.build_flags_for_files(&files).await?;
        if flags.is_empty() {
            return Ok(());
        }

        let mut dirs = self.lock();
        for plan in dirs.values_mut() {
            for item in &mut plan.items {
                if let Some(found) = flags.remove(item.path()) {
                    item.build_flags = Some(Arc::from(found));
                }
            }
        }
        Ok(())
    }

    /// Visit every directory in path order under one lock; `Visit::Remove`
    /// deletes the entry in the same pass.
    pub fn foreach<F>(&self, mut visit: F)
    where
        F: FnMut(&Path, &[PlanItem], Reason) -> Visit,
    {
        self.lock()
            .retain(|dir, plan| visit(dir, &plan.items, plan.reason) == Visit::Keep);
    }
}

fn lock_map(dirs: &Mutex<DirectoryMap>) -> MutexGuard<'_, DirectoryMap> {
    dirs.lock().unwrap_or_else(PoisonError::into_inner)
}

fn walk(
    ctx: &PlanContext,
    workdir: &Path,
    recursive: bool,
    token: &CancellationToken,
    dirs: &Mutex<DirectoryMap>,
) -> Result<usize> {
    let cache_root = ctx.layout.cache_root();
    let mut queue = VecDeque::from([workdir.to_path_buf()]);
    let mut planned = 0usize;

    while let Some(dir) = queue.pop_front() {
        if token.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }

        let mut items = Vec::new();
        match std::fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    let Ok(file_type) = entry.file_type() else {
                        continue;
                    };
                    if file_type.is_dir() {
                        if recursive
                            && !path.starts_with(cache_root)
                            && !ctx.vcs.is_ignored(&path, true)
                        {
                            queue.push_back(path);
                        }
                        continue;
                    }
                    if let Some(item) = plan_file(ctx, &path) {
                        items.push(item);
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{} vanished before it could be listed", dir.display());
            }
            Err(err) => {
                log::debug!("Cannot list {}: {err}", dir.display());
                continue;
            }
        }

        if items.is_empty() && !has_existing_index(&ctx.layout, &dir) {
            continue;
        }
        items.sort_by(|a, b| a.path().cmp(b.path()));
        lock_map(dirs).insert(
            dir,
            DirectoryPlan {
                items,
                reason: Reason::Initial,
            },
        );
        planned += 1;
    }

    Ok(planned)
}

fn plan_file(ctx: &PlanContext, path: &Path) -> Option<PlanItem> {
    let file_name = path.file_name()?.to_string_lossy();
    if ctx.is_skipped(&file_name) || ctx.vcs.is_ignored(path, false) {
        return None;
    }
    // Follows symlinks; dangling links and symlinked directories drop out here.
    let info = ctx.registry.describe_file(path)?;
    let indexer = ctx.registry.indexer_for(&info)?;
    Some(PlanItem::new(info, indexer.shared_id()))
}

fn has_existing_index(layout: &IndexLayout, dir: &Path) -> bool {
    layout
        .index_dir_for(dir)
        .is_ok_and(|index_dir| IndexLayout::has_index(&index_dir))
}

/// `None` means the directory is up to date (or has nothing to do).
fn classify(index_dir: &Path, items: &[PlanItem]) -> Option<Reason> {
    if !IndexLayout::has_index(index_dir) {
        return (!items.is_empty()).then_some(Reason::Initial);
    }
    if items.is_empty() {
        return Some(Reason::RemoveIndex);
    }

    // Only one of the two files exists: rebuild.
    let Some(index_mtime) = IndexLayout::index_mtime(index_dir) else {
        return Some(Reason::Changed);
    };
    if items.iter().any(|item| is_newer(item.file().modified, index_mtime)) {
        return Some(Reason::Expired);
    }

    let names = match FuzzyIndex::<NameRecord>::open(IndexLayout::names_path(index_dir)) {
        Ok(names) => names,
        Err(err) => {
            log::debug!("Unreadable index in {}: {err}", index_dir.display());
            return Some(Reason::Changed);
        }
    };
    let indexed = names.metadata_u32(N_FILES_KEY).map(|n| n as usize);
    if indexed != Some(items.len()) {
        return Some(Reason::Changed);
    }
    // Same count but different files, e.g. a rename.
    if items
        .iter()
        .any(|item| names.metadata_u32(&item.path().to_string_lossy()).is_none())
    {
        return Some(Reason::Changed);
    }
    None
}

fn is_newer(modified: Option<SystemTime>, index_mtime: SystemTime) -> bool {
    modified.map_or(true, |modified| modified > index_mtime)
}
