use crate::builtin;
use anyhow::{Context, Result};
use codeindex_indexer::{
    BuildSystem, CancellationToken, CompileCommands, Executor, GitignoreVcs, IndexLayout,
    IndexerConfig, NoBuildSystem, Plan, PlanContext, Registry, SchedulerContext, Vcs,
};
use codeindex_search::AggregateIndex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a command needs to know about one project.
pub struct Session {
    pub root: PathBuf,
    pub config: IndexerConfig,
    pub registry: Arc<Registry>,
    pub ctx: PlanContext,
}

impl Session {
    pub async fn open(path: &Path) -> Result<Self> {
        let root = tokio::fs::canonicalize(path)
            .await
            .with_context(|| format!("Cannot open project {}", path.display()))?;
        let config = IndexerConfig::load_for_project(&root)
            .await
            .context("Failed to load project configuration")?;

        let registry = Arc::new(Registry::new(
            builtin::plugins()?,
            config.language_catalog()?,
        )?);
        let vcs: Arc<dyn Vcs> = Arc::new(GitignoreVcs::open(&root)?);
        let layout = IndexLayout::new(&root, config.cache_root(&root));
        let ctx = PlanContext::new(registry.clone(), vcs, layout)
            .with_skip_suffixes(config.skip_suffixes.clone());

        log::debug!(
            "Project {} (cache {})",
            root.display(),
            ctx.layout.cache_root().display()
        );
        Ok(Self {
            root,
            config,
            registry,
            ctx,
        })
    }

    pub fn layout(&self) -> &IndexLayout {
        &self.ctx.layout
    }

    /// Populate and cull the whole project.
    pub async fn plan(&self, token: &CancellationToken) -> Result<Plan> {
        let plan = Plan::new();
        plan.populate(&self.ctx, &self.root, true, token).await?;
        plan.cull(self.layout(), token).await?;
        Ok(plan)
    }

    pub async fn build_system(
        &self,
        compile_commands: Option<&Path>,
    ) -> Result<Arc<dyn BuildSystem>> {
        let Some(path) = compile_commands else {
            return Ok(Arc::new(NoBuildSystem));
        };
        let commands = CompileCommands::load(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        log::info!("Loaded {} compile commands", commands.len());
        Ok(Arc::new(commands))
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.registry.clone(), self.layout().clone())
    }

    pub fn scheduler_context(&self, build_system: Arc<dyn BuildSystem>) -> SchedulerContext {
        SchedulerContext {
            plan: self.ctx.clone(),
            build_system,
            executor: self.executor(),
        }
    }

    /// Aggregate of every persisted directory index.
    pub async fn aggregate(&self) -> Result<AggregateIndex> {
        let aggregate = AggregateIndex::new();
        let loaded = aggregate.load_all(self.layout()).await?;
        if loaded == 0 {
            log::warn!(
                "No index found for {}; run `codeindex index` first",
                self.root.display()
            );
        }
        Ok(aggregate)
    }
}

/// Token cancelled on the first Ctrl-C.
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, stopping");
            cancel.cancel();
        }
    });
    token
}
