//! # Code Index Indexer
//!
//! Decides which directories need (re)indexing and builds their symbol indexes.
//!
//! ## Pipeline
//!
//! ```text
//! Project tree
//!     │
//!     ├──> Plan::populate (VCS aware, one DirectoryPlan per directory)
//!     │
//!     ├──> Plan::cull (drop directories whose index is current)
//!     │      └─> Initial / Expired / Changed / RemoveIndex
//!     │
//!     ├──> Plan::load_flags (build system)
//!     │
//!     └──> Executor (one DirectoryBuilder at a time)
//!            └─> <cache>/code-index/<dir>/{SymbolKeys, SymbolNames}
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use codeindex_indexer::{
//!     CancellationToken, Executor, GitignoreVcs, IndexLayout, IndexerConfig,
//!     LanguageCatalog, NoBuildSystem, Plan, PlanContext, Registry,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let root = Path::new("/path/to/project");
//!     let config = IndexerConfig::load_for_project(root).await?;
//!     let registry = Arc::new(Registry::new(Vec::new(), LanguageCatalog::builtin()?)?);
//!     let layout = IndexLayout::new(root, config.cache_root(root));
//!     let ctx = PlanContext::new(registry.clone(), Arc::new(GitignoreVcs::open(root)?), layout.clone());
//!
//!     let token = CancellationToken::new();
//!     let plan = Plan::new();
//!     plan.populate(&ctx, root, true, &token).await?;
//!     plan.cull(&layout, &token).await?;
//!     plan.load_flags(&NoBuildSystem).await?;
//!
//!     let report = Executor::new(registry, layout).execute(&plan, &token).await?;
//!     println!("Indexed {} directories", report.indexed.len());
//!     Ok(())
//! }
//! ```

mod build_flags;
mod builder;
mod config;
mod entry;
mod error;
mod executor;
mod language;
mod layout;
mod plan;
mod plugin;
mod registry;
#[cfg(test)]
mod test_support;
mod vcs;
mod watcher;

pub use build_flags::{BuildFlags, BuildSystem, CompileCommands, NoBuildSystem};
pub use builder::{BuildStats, DirectoryBuilder};
pub use config::{IndexerConfig, CACHE_DIR_ENV, CONFIG_FILE_NAME, PROJECT_DIR_NAME};
pub use entry::{
    display_name, fuzzy_key, Entry, EntryFlags, KeyRecord, NameRecord, SourceRange, SymbolKind,
    NAME_SEPARATOR,
};
pub use error::{IndexerError, Result};
pub use executor::{DirectoryEvent, ExecuteReport, Executor};
pub use language::{LanguageCatalog, LanguageDefinition};
pub use layout::{IndexLayout, N_FILES_KEY, SYMBOL_KEYS, SYMBOL_NAMES};
pub use plan::{DirectoryPlan, Plan, PlanContext, PlanItem, PlanSummary, Reason, Visit};
pub use plugin::{FileIndexer, FileInfo, IndexerPlugin};
pub use registry::{IndexerInfo, Registry};
pub use tokio_util::sync::CancellationToken;
pub use vcs::{GitignoreVcs, Vcs};
pub use watcher::{ReindexScheduler, SchedulerContext, SchedulerStatus};
