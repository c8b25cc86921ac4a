use crate::build_flags::BuildSystem;
use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::executor::{ExecuteReport, Executor};
use crate::plan::{Plan, PlanContext};
use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

const VCS_TRIGGER_REASON: &str = "vcs_changed";

/// Everything one re-index cycle needs.
#[derive(Clone)]
pub struct SchedulerContext {
    pub plan: PlanContext,
    pub build_system: Arc<dyn BuildSystem>,
    pub executor: Executor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub pending: usize,
    pub running: bool,
    pub paused: bool,
    pub completed_runs: u64,
    pub last_run: Option<SystemTime>,
    pub last_error: Option<String>,
}

impl SchedulerStatus {
    const fn initial() -> Self {
        Self {
            pending: 0,
            running: false,
            paused: false,
            completed_runs: 0,
            last_run: None,
            last_error: None,
        }
    }
}

enum SchedulerCommand {
    TriggerFull { reason: String },
    TriggerDirectory { dir: PathBuf },
    Pause,
    Resume,
}

/// Debounces file-system and VCS events into plan/cull/execute cycles.
///
/// ```text
/// notify events ──┐
///                 ├──> DebounceState (per directory) ──> populate ─> cull ─> load_flags ─> execute
/// manual triggers ┘          full re-plan supersedes
/// ```
#[derive(Clone)]
pub struct ReindexScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    command_tx: mpsc::Sender<SchedulerCommand>,
    status_tx: watch::Sender<SchedulerStatus>,
    executor: Executor,
    shutdown: CancellationToken,
    _watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ReindexScheduler {
    /// Watch the working directory and re-index on change.
    pub fn start(ctx: SchedulerContext, config: &IndexerConfig) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let root = ctx.plan.vcs.working_directory().to_path_buf();
        let watcher = create_fs_watcher(&root, event_tx, config.poll_interval())?;
        Ok(Self::spawn(ctx, config.debounce(), Some(watcher), event_rx))
    }

    /// Scheduler driven by manual triggers only.
    #[must_use]
    pub fn manual(ctx: SchedulerContext, debounce: Duration) -> Self {
        let (_event_tx, event_rx) = mpsc::channel(1);
        Self::spawn(ctx, debounce, None, event_rx)
    }

    fn spawn(
        ctx: SchedulerContext,
        debounce: Duration,
        watcher: Option<RecommendedWatcher>,
        event_rx: mpsc::Receiver<notify::Result<Event>>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (status_tx, _) = watch::channel(SchedulerStatus::initial());
        let shutdown = CancellationToken::new();
        let executor = ctx.executor.clone();

        spawn_schedule_loop(
            ctx,
            debounce,
            event_rx,
            command_rx,
            status_tx.clone(),
            shutdown.clone(),
        );

        Self {
            inner: Arc::new(SchedulerInner {
                command_tx,
                status_tx,
                executor,
                shutdown,
                _watcher: Mutex::new(watcher),
            }),
        }
    }

    async fn send(&self, cmd: SchedulerCommand) -> Result<()> {
        self.inner
            .command_tx
            .send(cmd)
            .await
            .map_err(|_| IndexerError::Other("re-index scheduler has shut down".to_string()))
    }

    /// Re-plan the whole working directory now.
    pub async fn trigger_full(&self, reason: impl Into<String>) -> Result<()> {
        self.send(SchedulerCommand::TriggerFull {
            reason: reason.into(),
        })
        .await
    }

    /// Re-plan one directory (non-recursive) after the debounce delay.
    pub async fn trigger_directory(&self, dir: impl Into<PathBuf>) -> Result<()> {
        self.send(SchedulerCommand::TriggerDirectory { dir: dir.into() })
            .await
    }

    /// Stop starting cycles; triggers keep accumulating.
    pub async fn pause(&self) -> Result<()> {
        self.send(SchedulerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(SchedulerCommand::Resume).await
    }

    /// Cancel in-flight work and stop the loop.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        self.inner.status_tx.borrow().clone()
    }

    #[must_use]
    pub fn status_stream(&self) -> watch::Receiver<SchedulerStatus> {
        self.inner.status_tx.subscribe()
    }
}

impl Drop for ReindexScheduler {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.shutdown.cancel();
        }
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
    poll_interval: Duration,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(poll_interval),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    debug!("Watching {}", root.display());
    Ok(watcher)
}

fn spawn_schedule_loop(
    ctx: SchedulerContext,
    debounce: Duration,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    mut command_rx: mpsc::Receiver<SchedulerCommand>,
    status_tx: watch::Sender<SchedulerStatus>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut state = DebounceState::new(debounce);
        let mut events_open = true;

        loop {
            let paused = status_tx.borrow().paused;
            let next_deadline = if paused { None } else { state.next_deadline() };

            tokio::select! {
                () = shutdown.cancelled() => break,
                event = event_rx.recv(), if events_open => match event {
                    Some(event) => {
                        handle_event(&ctx.plan, event, &mut state, Instant::now());
                        status_tx.send_modify(|s| s.pending = state.pending());
                    }
                    None => events_open = false,
                },
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        SchedulerCommand::TriggerFull { reason } => state.force_full(reason),
                        SchedulerCommand::TriggerDirectory { dir } => {
                            state.record_directory(dir, Instant::now());
                        }
                        SchedulerCommand::Pause => status_tx.send_modify(|s| s.paused = true),
                        SchedulerCommand::Resume => status_tx.send_modify(|s| s.paused = false),
                    }
                    status_tx.send_modify(|s| s.pending = state.pending());
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    let Some(batch) = state.take_due(Instant::now()) else { continue };
                    status_tx.send_modify(|s| {
                        s.running = true;
                        s.pending = state.pending();
                    });

                    let result = run_cycle(&ctx, &batch, &shutdown.child_token()).await;
                    status_tx.send_modify(|s| {
                        s.running = false;
                        s.last_run = Some(SystemTime::now());
                        match &result {
                            Ok(_) => {
                                s.completed_runs += 1;
                                s.last_error = None;
                            }
                            Err(err) if err.is_cancelled() => {}
                            Err(err) => s.last_error = Some(err.to_string()),
                        }
                    });
                    match result {
                        Ok(report) => info!(
                            "Re-index ({}) finished: {} indexed, {} removed, {} failed",
                            batch.describe(),
                            report.indexed.len(),
                            report.removed.len(),
                            report.failed.len()
                        ),
                        Err(err) if err.is_cancelled() => debug!("Re-index cancelled"),
                        Err(err) => error!("Re-index ({}) failed: {err}", batch.describe()),
                    }
                }
            }
        }
        debug!("Re-index scheduler stopped");
    });
}

async fn run_cycle(
    ctx: &SchedulerContext,
    batch: &Batch,
    token: &CancellationToken,
) -> Result<ExecuteReport> {
    let plan = Plan::new();
    match batch {
        Batch::Full { .. } => {
            let root = ctx.plan.vcs.working_directory().to_path_buf();
            plan.populate(&ctx.plan, &root, true, token).await?;
        }
        Batch::Directories(dirs) => {
            for dir in dirs {
                plan.populate(&ctx.plan, dir, false, token).await?;
            }
        }
    }
    plan.cull(&ctx.plan.layout, token).await?;
    plan.load_flags(ctx.build_system.as_ref()).await?;
    ctx.executor.execute(&plan, token).await
}

fn handle_event(
    ctx: &PlanContext,
    event: notify::Result<Event>,
    state: &mut DebounceState,
    now: Instant,
) {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            warn!("Watcher error: {err}");
            return;
        }
    };
    if event.kind.is_access() {
        return;
    }

    for path in &event.paths {
        match classify_path(ctx, path) {
            Some(Trigger::Vcs) => state.record_full(VCS_TRIGGER_REASON, now),
            Some(Trigger::Directory(dir)) => state.record_directory(dir, now),
            None => {}
        }
    }
}

enum Trigger {
    Vcs,
    Directory(PathBuf),
}

fn classify_path(ctx: &PlanContext, path: &Path) -> Option<Trigger> {
    if let Some(state_dir) = ctx.vcs.state_dir() {
        if let Ok(relative) = path.strip_prefix(state_dir) {
            let first = relative.components().next()?.as_os_str().to_string_lossy();
            return matches!(first.as_ref(), "HEAD" | "index" | "refs" | "packed-refs")
                .then_some(Trigger::Vcs);
        }
    }
    if path.starts_with(ctx.layout.cache_root()) || ctx.vcs.is_ignored(path, false) {
        return None;
    }
    let file_name = path.file_name()?.to_string_lossy();
    if ctx
        .skip_suffixes
        .iter()
        .any(|suffix| file_name.ends_with(suffix.as_str()))
    {
        return None;
    }
    if !ctx.registry.recognizes(path) {
        return None;
    }
    path.parent().map(|dir| Trigger::Directory(dir.to_path_buf()))
}

/// Work that became due.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Batch {
    Full { reason: String },
    Directories(Vec<PathBuf>),
}

impl Batch {
    fn describe(&self) -> String {
        match self {
            Self::Full { reason } => format!("full, {reason}"),
            Self::Directories(dirs) => format!("{} directories", dirs.len()),
        }
    }
}

/// Pending triggers keyed by directory. Each new trigger for a key pushes its
/// deadline out by the debounce delay; a pending full re-plan absorbs every
/// directory trigger.
struct DebounceState {
    debounce: Duration,
    full: Option<(Instant, String)>,
    dirs: HashMap<PathBuf, Instant>,
}

impl DebounceState {
    fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            full: None,
            dirs: HashMap::new(),
        }
    }

    fn record_full(&mut self, reason: &str, now: Instant) {
        let deadline = now + self.debounce;
        match &mut self.full {
            // Keep an earlier forced deadline.
            Some((current, _)) if *current <= now => {}
            Some((current, _)) => *current = deadline,
            None => self.full = Some((deadline, reason.to_string())),
        }
        self.dirs.clear();
    }

    fn force_full(&mut self, reason: String) {
        self.full = Some((Instant::now(), reason));
        self.dirs.clear();
    }

    fn record_directory(&mut self, dir: PathBuf, now: Instant) {
        if self.full.is_some() {
            return;
        }
        self.dirs.insert(dir, now + self.debounce);
    }

    fn pending(&self) -> usize {
        usize::from(self.full.is_some()) + self.dirs.len()
    }

    fn next_deadline(&self) -> Option<Instant> {
        let dirs = self.dirs.values().copied().min();
        match (&self.full, dirs) {
            (Some((full, _)), Some(dir)) => Some((*full).min(dir)),
            (Some((full, _)), None) => Some(*full),
            (None, dir) => dir,
        }
    }

    fn take_due(&mut self, now: Instant) -> Option<Batch> {
        if let Some((deadline, _)) = &self.full {
            if *deadline <= now {
                let (_, reason) = self.full.take()?;
                self.dirs.clear();
                return Some(Batch::Full { reason });
            }
            return None;
        }

        let mut due: Vec<PathBuf> = self
            .dirs
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(dir, _)| dir.clone())
            .collect();
        if due.is_empty() {
            return None;
        }
        for dir in &due {
            self.dirs.remove(dir);
        }
        due.sort();
        Some(Batch::Directories(due))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEBOUNCE: Duration = Duration::from_millis(100);

    #[test]
    fn repeated_triggers_coalesce_per_directory() {
        let mut state = DebounceState::new(DEBOUNCE);
        let start = Instant::now();
        state.record_directory(PathBuf::from("/p/a"), start);
        state.record_directory(PathBuf::from("/p/a"), start + Duration::from_millis(60));
        state.record_directory(PathBuf::from("/p/b"), start + Duration::from_millis(10));
        assert_eq!(state.pending(), 2);
        assert_eq!(state.next_deadline(), Some(start + Duration::from_millis(110)));

        // b is due, a was pushed back by its second save.
        assert_eq!(
            state.take_due(start + Duration::from_millis(120)),
            Some(Batch::Directories(vec![PathBuf::from("/p/b")]))
        );
        assert_eq!(state.take_due(start + Duration::from_millis(150)), None);
        assert_eq!(
            state.take_due(start + Duration::from_millis(160)),
            Some(Batch::Directories(vec![PathBuf::from("/p/a")]))
        );
        assert_eq!(state.pending(), 0);
        assert_eq!(state.next_deadline(), None);
    }

    #[test]
    fn full_replan_supersedes_directory_triggers() {
        let mut state = DebounceState::new(DEBOUNCE);
        let start = Instant::now();
        state.record_directory(PathBuf::from("/p/a"), start);
        state.record_full("vcs_changed", start);
        state.record_directory(PathBuf::from("/p/b"), start);
        assert_eq!(state.pending(), 1);

        assert_eq!(state.take_due(start + Duration::from_millis(50)), None);
        assert_eq!(
            state.take_due(start + DEBOUNCE),
            Some(Batch::Full {
                reason: "vcs_changed".to_string()
            })
        );
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn forced_full_is_due_immediately() {
        let mut state = DebounceState::new(Duration::from_secs(60));
        state.force_full("manual".to_string());
        let deadline = state.next_deadline().unwrap();
        assert!(deadline <= Instant::now());
        assert!(matches!(
            state.take_due(Instant::now()),
            Some(Batch::Full { .. })
        ));
    }
}
