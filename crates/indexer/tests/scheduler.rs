use async_trait::async_trait;
use codeindex_indexer::{
    DirectoryEvent, Entry, Executor, FileIndexer, FileInfo, GitignoreVcs, IndexLayout,
    IndexerPlugin, LanguageCatalog, NoBuildSystem, PlanContext, Registry, ReindexScheduler,
    SchedulerContext, SymbolKind, Vcs,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct OneSymbol;

#[async_trait]
impl FileIndexer for OneSymbol {
    async fn index_file(
        &self,
        file: &FileInfo,
        _flags: &[String],
    ) -> codeindex_indexer::Result<Vec<Entry>> {
        Ok(vec![Entry::new(file.name.clone(), SymbolKind::Other).at(1, 1)])
    }
}

struct Plugin;

impl IndexerPlugin for Plugin {
    fn id(&self) -> &str {
        "one"
    }

    fn languages(&self) -> &str {
        "python"
    }

    fn create(&self) -> Arc<dyn FileIndexer> {
        Arc::new(OneSymbol)
    }
}

fn scheduler(root: &Path, cache: &Path) -> ReindexScheduler {
    let plugin: Arc<dyn IndexerPlugin> = Arc::new(Plugin);
    let registry =
        Arc::new(Registry::new(vec![plugin], LanguageCatalog::builtin().unwrap()).unwrap());
    let vcs: Arc<dyn Vcs> = Arc::new(GitignoreVcs::open(root).unwrap());
    let layout = IndexLayout::new(root, cache);
    let ctx = SchedulerContext {
        plan: PlanContext::new(registry.clone(), vcs, layout.clone()),
        build_system: Arc::new(NoBuildSystem),
        executor: Executor::new(registry, layout),
    };
    ReindexScheduler::manual(ctx, Duration::from_millis(20))
}

async fn next_event(
    events: &mut tokio::sync::broadcast::Receiver<DirectoryEvent>,
) -> DirectoryEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("scheduler produced no event")
        .unwrap()
}

#[tokio::test]
async fn directory_trigger_indexes_that_directory_only() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("project");
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::write(root.join("top.py"), "x").unwrap();
    std::fs::write(root.join("sub/inner.py"), "y").unwrap();

    let scheduler = scheduler(&root, &tmp.path().join("cache"));
    let mut events = scheduler.executor().subscribe();

    scheduler.trigger_directory(root.join("sub")).await.unwrap();
    match next_event(&mut events).await {
        DirectoryEvent::Indexed { source_dir, .. } => assert_eq!(source_dir, root.join("sub")),
        other => panic!("unexpected {other:?}"),
    }
    let top_index = scheduler.executor().layout().index_dir_for(&root).unwrap();
    assert!(!IndexLayout::has_index(&top_index));

    scheduler.shutdown();
}

#[tokio::test]
async fn paused_triggers_run_on_resume() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("project");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("main.py"), "x").unwrap();

    let scheduler = scheduler(&root, &tmp.path().join("cache"));
    let mut events = scheduler.executor().subscribe();

    scheduler.pause().await.unwrap();
    scheduler.trigger_full("manual").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
    assert!(scheduler.status().paused);
    assert_eq!(scheduler.status().pending, 1);

    scheduler.resume().await.unwrap();
    match next_event(&mut events).await {
        DirectoryEvent::Indexed { source_dir, .. } => assert_eq!(source_dir, root),
        other => panic!("unexpected {other:?}"),
    }

    scheduler.shutdown();
}
