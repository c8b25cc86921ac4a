use crate::builder::{BuildStats, DirectoryBuilder};
use crate::error::{IndexerError, Result};
use crate::layout::IndexLayout;
use crate::plan::{Plan, Reason, Visit};
use crate::registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Published after every directory the executor finishes.
#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    Indexed {
        source_dir: PathBuf,
        index_dir: PathBuf,
        stats: BuildStats,
    },
    Removed {
        source_dir: PathBuf,
        index_dir: PathBuf,
    },
    Failed {
        source_dir: PathBuf,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteReport {
    pub indexed: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl ExecuteReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Turns a [`Plan`] into index files, one directory at a time.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    registry: Arc<Registry>,
    layout: IndexLayout,
    progress_tx: watch::Sender<f64>,
    events_tx: broadcast::Sender<DirectoryEvent>,
}

impl Executor {
    #[must_use]
    pub fn new(registry: Arc<Registry>, layout: IndexLayout) -> Self {
        let (progress_tx, _) = watch::channel(0.0);
        let (events_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(ExecutorInner {
                registry,
                layout,
                progress_tx,
                events_tx,
            }),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    #[must_use]
    pub fn layout(&self) -> &IndexLayout {
        &self.inner.layout
    }

    /// Fraction of the current run that is done, `0.0..=1.0`.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.inner.progress_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.inner.events_tx.subscribe()
    }

    fn emit(&self, event: DirectoryEvent) {
        // No subscribers is fine.
        let _ = self.inner.events_tx.send(event);
    }

    #[allow(clippy::cast_precision_loss)]
    fn report_progress(&self, completed: usize, total: usize) {
        let fraction = if total == 0 {
            1.0
        } else {
            completed as f64 / total as f64
        };
        self.inner.progress_tx.send_replace(fraction);
    }

    /// Delete the index of every `RemoveIndex` directory and build every other
    /// directory, strictly one after another.
    ///
    /// A failed directory is reported and skipped. Cancellation stops before
    /// the next directory and returns `Cancelled`; directories not reached yet
    /// stay in `plan`.
    pub async fn execute(&self, plan: &Plan, token: &CancellationToken) -> Result<ExecuteReport> {
        let total = plan.len();
        self.report_progress(0, total);

        let mut report = ExecuteReport::default();
        let mut removals = Vec::new();
        let mut builders = Vec::new();
        plan.foreach(|dir, items, reason| {
            let index_dir = match self.inner.layout.index_dir_for(dir) {
                Ok(index_dir) => index_dir,
                Err(err) => {
                    log::warn!("Not indexing {}: {err}", dir.display());
                    report.failed.push(dir.to_path_buf());
                    return Visit::Remove;
                }
            };
            if reason == Reason::RemoveIndex {
                removals.push((dir.to_path_buf(), index_dir));
                return Visit::Remove;
            }
            let mut builder = DirectoryBuilder::new(dir, index_dir);
            for item in items {
                builder.add_item(item.clone());
            }
            builders.push(builder);
            Visit::Keep
        });

        let mut completed = report.failed.len();
        log::info!(
            "Executing plan: {} builds, {} removals",
            builders.len(),
            removals.len()
        );

        for (source_dir, index_dir) in removals {
            let removed = IndexLayout::remove_index(&index_dir).await;
            log::debug!("Removed {removed} index files for {}", source_dir.display());
            report.removed.push(source_dir.clone());
            self.emit(DirectoryEvent::Removed {
                source_dir,
                index_dir,
            });
            completed += 1;
            self.report_progress(completed, total);
        }

        for builder in builders {
            if token.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            let source_dir = builder.source_dir().to_path_buf();
            let index_dir = builder.index_dir().to_path_buf();

            match builder.run(&self.inner.registry, token).await {
                Ok(stats) => {
                    report.indexed.push(source_dir.clone());
                    self.emit(DirectoryEvent::Indexed {
                        source_dir: source_dir.clone(),
                        index_dir,
                        stats,
                    });
                }
                Err(err) if err.is_cancelled() => {
                    log::debug!("Execution cancelled at {}", source_dir.display());
                    return Err(err);
                }
                Err(err) => {
                    log::warn!("Failed to index {}: {err}", source_dir.display());
                    report.failed.push(source_dir.clone());
                    self.emit(DirectoryEvent::Failed {
                        source_dir: source_dir.clone(),
                        error: err.to_string(),
                    });
                }
            }

            plan.remove(&source_dir);
            completed += 1;
            self.report_progress(completed, total);
        }

        self.inner.progress_tx.send_replace(1.0);
        Ok(report)
    }
}
