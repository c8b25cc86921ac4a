use async_trait::async_trait;
use codeindex_indexer::{
    CancellationToken, DirectoryBuilder, Entry, EntryFlags, Executor, FileIndexer, FileInfo,
    GitignoreVcs, IndexLayout, IndexerError, IndexerPlugin, LanguageCatalog, NameRecord,
    NoBuildSystem, Plan, PlanContext, PlanItem, Reason, Registry, SymbolKind, Vcs, N_FILES_KEY,
};
use codeindex_store::FuzzyIndex;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// `slow*` files take a while, `fail*` files fail at once, the rest yield one
/// function named after the file stem.
struct ScriptedIndexer;

#[async_trait]
impl FileIndexer for ScriptedIndexer {
    async fn index_file(
        &self,
        file: &FileInfo,
        _flags: &[String],
    ) -> codeindex_indexer::Result<Vec<Entry>> {
        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem.starts_with("fail") {
            return Err(IndexerError::Other("scripted failure".to_string()));
        }
        if stem.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(vec![Entry::new(stem.clone(), SymbolKind::Function)
            .with_key(format!("{stem}::main"))
            .with_flags(EntryFlags::IS_DEFINITION)
            .at(1, 1)])
    }
}

struct ScriptedPlugin;

impl IndexerPlugin for ScriptedPlugin {
    fn id(&self) -> &str {
        "scripted"
    }

    fn languages(&self) -> &str {
        "python"
    }

    fn create(&self) -> Arc<dyn FileIndexer> {
        Arc::new(ScriptedIndexer)
    }
}

struct Project {
    _tmp: TempDir,
    root: PathBuf,
    ctx: PlanContext,
    registry: Arc<Registry>,
}

impl Project {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("project");
        std::fs::create_dir_all(&root).unwrap();
        let plugin: Arc<dyn IndexerPlugin> = Arc::new(ScriptedPlugin);
        let registry =
            Arc::new(Registry::new(vec![plugin], LanguageCatalog::builtin().unwrap()).unwrap());
        let vcs: Arc<dyn Vcs> = Arc::new(GitignoreVcs::open(&root).unwrap());
        let layout = IndexLayout::new(&root, tmp.path().join("cache"));
        let ctx = PlanContext::new(registry.clone(), vcs, layout);
        Self {
            _tmp: tmp,
            root,
            ctx,
            registry,
        }
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn layout(&self) -> &IndexLayout {
        &self.ctx.layout
    }

    fn index_dir(&self, dir: &Path) -> PathBuf {
        self.layout().index_dir_for(dir).unwrap()
    }

    async fn plan(&self) -> Plan {
        let token = CancellationToken::new();
        let plan = Plan::new();
        plan.populate(&self.ctx, &self.root, true, &token)
            .await
            .unwrap();
        plan.cull(self.layout(), &token).await.unwrap();
        plan.load_flags(&NoBuildSystem).await.unwrap();
        plan
    }

    async fn index(&self) -> codeindex_indexer::ExecuteReport {
        let plan = self.plan().await;
        Executor::new(self.registry.clone(), self.layout().clone())
            .execute(&plan, &CancellationToken::new())
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn empty_project_plans_nothing_and_finishes_at_full_progress() {
    let project = Project::new();
    project.write("README.md", "# nothing to index");

    let plan = project.plan().await;
    assert!(plan.is_empty());

    let executor = Executor::new(project.registry.clone(), project.layout().clone());
    let progress = executor.progress();
    let report = executor
        .execute(&plan, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_empty());
    assert!((*progress.borrow() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn single_new_file_is_indexed_then_considered_current() {
    let project = Project::new();
    project.write("app.py", "print('hi')\n");

    let token = CancellationToken::new();
    let plan = Plan::new();
    plan.populate(&project.ctx, &project.root, true, &token)
        .await
        .unwrap();
    plan.cull(project.layout(), &token).await.unwrap();
    assert_eq!(plan.reason_of(&project.root), Some(Reason::Initial));

    let report = Executor::new(project.registry.clone(), project.layout().clone())
        .execute(&plan, &token)
        .await
        .unwrap();
    assert_eq!(report.indexed, vec![project.root.clone()]);

    let index_dir = project.index_dir(&project.root);
    assert!(IndexLayout::keys_path(&index_dir).is_file());
    assert!(IndexLayout::names_path(&index_dir).is_file());

    assert!(project.plan().await.is_empty());
}

#[tokio::test]
async fn culling_twice_without_changes_yields_empty_plans() {
    let project = Project::new();
    project.write("a.py", "a");
    project.write("pkg/b.py", "b");
    project.write("pkg/deep/c.py", "c");
    project.index().await;

    assert!(project.plan().await.is_empty());
    assert!(project.plan().await.is_empty());
}

#[tokio::test]
async fn renamed_file_marks_directory_changed() {
    let project = Project::new();
    let old = project.write("pkg/old.py", "x");
    project.index().await;

    let new = project.root.join("pkg/new.py");
    std::fs::rename(&old, &new).unwrap();
    // A rename keeps the mtime, so only the file set differs.
    let plan = project.plan().await;
    assert_eq!(plan.reason_of(&project.root.join("pkg")), Some(Reason::Changed));
}

#[tokio::test]
async fn file_ids_follow_submission_order_not_completion_order() {
    let project = Project::new();
    let f0 = project.write("src/slow0.py", "");
    let f1 = project.write("src/fail1.py", "");
    let f2 = project.write("src/ok2.py", "");

    let index_dir = project.index_dir(&project.root.join("src"));
    let mut builder = DirectoryBuilder::new(project.root.join("src"), &index_dir);
    for path in [&f0, &f1, &f2] {
        builder.add_item(PlanItem::new(FileInfo::new(path.clone()), "scripted"));
    }
    let stats = builder
        .run(&project.registry, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.files, 3);
    assert_eq!(stats.failed_files, 1);

    let names: FuzzyIndex<NameRecord> = FuzzyIndex::load(IndexLayout::names_path(&index_dir))
        .await
        .unwrap();
    assert_eq!(names.metadata_u32(N_FILES_KEY), Some(3));
    for (id, path) in [&f0, &f1, &f2].into_iter().enumerate() {
        let path = path.to_string_lossy().into_owned();
        assert_eq!(names.metadata_string(&id.to_string()), Some(path.as_str()));
        assert_eq!(names.metadata_u32(&path), Some(u32::try_from(id).unwrap()));
    }

    let slow = names.query("\u{1F}slow0", 1).next().unwrap();
    assert_eq!(names.get(&slow).unwrap().1.file_id, 0);
}

#[tokio::test]
async fn deleted_files_remove_the_persisted_index() {
    let project = Project::new();
    let lone = project.write("gone/only.py", "x");
    project.write("kept.py", "k");
    project.index().await;

    let index_dir = project.index_dir(&project.root.join("gone"));
    assert!(IndexLayout::has_index(&index_dir));

    std::fs::remove_file(&lone).unwrap();
    let plan = project.plan().await;
    assert_eq!(
        plan.reason_of(&project.root.join("gone")),
        Some(Reason::RemoveIndex)
    );

    let executor = Executor::new(project.registry.clone(), project.layout().clone());
    let mut events = executor.subscribe();
    let report = executor
        .execute(&plan, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.removed, vec![project.root.join("gone")]);
    assert!(report.indexed.is_empty());
    assert!(!IndexLayout::has_index(&index_dir));
    assert!(plan.is_empty());
    assert!(matches!(
        events.recv().await.unwrap(),
        codeindex_indexer::DirectoryEvent::Removed { .. }
    ));

    // Nothing left to do for the emptied directory.
    assert!(project.plan().await.is_empty());
}
