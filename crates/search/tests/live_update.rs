use async_trait::async_trait;
use codeindex_indexer::{
    CancellationToken, Entry, EntryFlags, Executor, FileIndexer, FileInfo, GitignoreVcs,
    IndexLayout, IndexerPlugin, LanguageCatalog, NoBuildSystem, Plan, PlanContext, Registry,
    SymbolKind, Vcs,
};
use codeindex_search::{AggregateIndex, LoadOutcome};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// `def name` lines become function definitions, `decl name` lines
/// declarations.
struct DefIndexer;

#[async_trait]
impl FileIndexer for DefIndexer {
    async fn index_file(
        &self,
        file: &FileInfo,
        _flags: &[String],
    ) -> codeindex_indexer::Result<Vec<Entry>> {
        let text = tokio::fs::read_to_string(&file.path).await?;
        let entries = (1u32..)
            .zip(text.lines())
            .filter_map(|(line, content)| {
                let (word, name) = content.split_once(' ')?;
                let flags = match word {
                    "def" => EntryFlags::IS_DEFINITION,
                    "decl" => EntryFlags::NONE,
                    _ => return None,
                };
                Some(
                    Entry::new(name, SymbolKind::Function)
                        .with_key(name)
                        .with_flags(flags)
                        .at(line, 1),
                )
            })
            .collect();
        Ok(entries)
    }
}

struct DefPlugin;

impl IndexerPlugin for DefPlugin {
    fn id(&self) -> &str {
        "def"
    }

    fn languages(&self) -> &str {
        "python"
    }

    fn create(&self) -> Arc<dyn FileIndexer> {
        Arc::new(DefIndexer)
    }
}

struct Project {
    _tmp: TempDir,
    root: PathBuf,
    ctx: PlanContext,
    executor: Executor,
}

impl Project {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("project");
        std::fs::create_dir_all(&root).unwrap();
        let plugin: Arc<dyn IndexerPlugin> = Arc::new(DefPlugin);
        let registry =
            Arc::new(Registry::new(vec![plugin], LanguageCatalog::builtin().unwrap()).unwrap());
        let vcs: Arc<dyn Vcs> = Arc::new(GitignoreVcs::open(&root).unwrap());
        let layout = IndexLayout::new(&root, root.join(".codeindex/cache"));
        let ctx = PlanContext::new(registry.clone(), vcs, layout.clone());
        let executor = Executor::new(registry, layout);
        Self {
            _tmp: tmp,
            root,
            ctx,
            executor,
        }
    }

    fn write(&self, relative: &str, contents: &str) {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    async fn reindex(&self) {
        let token = CancellationToken::new();
        let plan = Plan::new();
        plan.populate(&self.ctx, &self.root, true, &token)
            .await
            .unwrap();
        plan.cull(&self.ctx.layout, &token).await.unwrap();
        plan.load_flags(&NoBuildSystem).await.unwrap();
        self.executor.execute(&plan, &token).await.unwrap();
    }
}

async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached");
}

fn file_of(aggregate: &AggregateIndex, key: &str) -> Option<PathBuf> {
    aggregate
        .lookup_symbol(key)
        .and_then(|symbol| symbol.location().map(|l| l.path.clone()))
}

#[tokio::test]
async fn executor_events_keep_the_aggregate_current() {
    let project = Project::new();
    project.write("net/socket.py", "decl connect\n");
    project.write("net/impl/tcp.py", "\ndef connect\n");

    let aggregate = AggregateIndex::new();
    let follower = aggregate.follow(project.executor.subscribe());
    project.reindex().await;

    eventually(|| aggregate.directory_count() == 2).await;
    let symbol = aggregate.lookup_symbol("connect").unwrap();
    let definition = symbol.definition.unwrap();
    assert_eq!(definition.path, project.root.join("net/impl/tcp.py"));
    assert_eq!((definition.line, definition.column), (1, 0));

    // New file in an already indexed directory.
    tokio::time::sleep(Duration::from_millis(20)).await;
    project.write("net/udp.py", "def bind\n");
    project.reindex().await;
    eventually(|| file_of(&aggregate, "bind").is_some()).await;
    assert_eq!(
        file_of(&aggregate, "bind"),
        Some(project.root.join("net/udp.py"))
    );
    assert_eq!(aggregate.directory_count(), 2);

    drop(project);
    follower.await.unwrap();
}

#[tokio::test]
async fn search_merges_across_directories() {
    let project = Project::new();
    project.write("a/one.py", "def read_config\ndecl read_cache\n");
    project.write("b/two.py", "def read_configuration\n");
    project.reindex().await;

    let aggregate = AggregateIndex::new();
    let loaded = aggregate.load_all(&project.ctx.layout).await.unwrap();
    assert_eq!(loaded, 2);

    let found = aggregate
        .populate_query("read_conf", 0, &CancellationToken::new())
        .await
        .unwrap();
    let titles: Vec<&str> = found.results.iter().map(|r| r.title.as_str()).collect();
    assert!(titles.contains(&"read_config"));
    assert!(titles.contains(&"read_configuration"));
    assert!(found
        .results
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));
    assert!(!found.truncated);

    let capped = aggregate
        .populate_query("read", 1, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(capped.results.len(), 1);
    assert!(capped.truncated);

    let index_dir = project.ctx.layout.index_dir_for(&project.root.join("a")).unwrap();
    let again = aggregate
        .load(&index_dir, project.root.join("a"))
        .await
        .unwrap();
    assert_eq!(again, LoadOutcome::Unchanged);
}
