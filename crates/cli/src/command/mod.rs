mod session;

use anyhow::{bail, Result};
use codeindex_indexer::{DirectoryEvent, ReindexScheduler, Visit};
use indicatif::{ProgressBar, ProgressStyle};
use session::{ctrl_c_token, Session};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// `dir` relative to the project root, `.` for the root itself.
fn relative(root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => dir.display().to_string(),
    }
}

pub async fn plan(path: &Path) -> Result<()> {
    let session = Session::open(path).await?;
    let plan = session.plan(&ctrl_c_token()).await?;

    plan.foreach(|dir, items, reason| {
        println!(
            "{:<12} {:>5}  {}",
            reason.as_str(),
            items.len(),
            relative(&session.root, dir)
        );
        Visit::Keep
    });

    let summary = plan.summary();
    println!(
        "{} directories ({} initial, {} expired, {} changed, {} to remove), {} files",
        summary.directories(),
        summary.initial,
        summary.expired,
        summary.changed,
        summary.remove,
        summary.files
    );
    Ok(())
}

pub async fn index(path: &Path, compile_commands: Option<&Path>) -> Result<()> {
    let session = Session::open(path).await?;
    let token = ctrl_c_token();
    let plan = session.plan(&token).await?;
    if plan.is_empty() {
        println!("Index of {} is up to date", session.root.display());
        return Ok(());
    }
    let build_system = session.build_system(compile_commands).await?;
    plan.load_flags(build_system.as_ref()).await?;

    let executor = session.executor();
    let bar = ProgressBar::new(plan.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓▒░  "),
    );
    let updater = spawn_progress(
        bar.clone(),
        executor.progress(),
        executor.subscribe(),
        session.root.clone(),
    );

    let result = executor.execute(&plan, &token).await;
    updater.abort();
    bar.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(err) if err.is_cancelled() => {
            println!("Interrupted; {} directories still need indexing", plan.len());
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    println!(
        "Indexed {} directories, removed {}, failed {}",
        report.indexed.len(),
        report.removed.len(),
        report.failed.len()
    );
    for dir in &report.failed {
        eprintln!("  failed: {}", relative(&session.root, dir));
    }
    Ok(())
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn spawn_progress(
    bar: ProgressBar,
    mut progress: watch::Receiver<f64>,
    mut events: broadcast::Receiver<DirectoryEvent>,
    root: PathBuf,
) -> JoinHandle<()> {
    let total = bar.length().unwrap_or(0);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = progress.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let fraction = *progress.borrow_and_update();
                    bar.set_position((fraction * total as f64).round() as u64);
                }
                event = events.recv() => match event {
                    Ok(
                        DirectoryEvent::Indexed { source_dir, .. }
                        | DirectoryEvent::Removed { source_dir, .. },
                    ) => bar.set_message(relative(&root, &source_dir)),
                    Ok(DirectoryEvent::Failed { source_dir, error }) => {
                        bar.println(format!("failed {}: {error}", relative(&root, &source_dir)));
                    }
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

pub async fn search(path: &Path, query: &str, limit: usize, json: bool) -> Result<()> {
    let session = Session::open(path).await?;
    let aggregate = session.aggregate().await?;
    let found = aggregate
        .populate_query(query, limit, &ctrl_c_token())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }
    if found.results.is_empty() {
        println!("No matches for {query:?}");
        return Ok(());
    }
    for hit in &found.results {
        println!(
            "{:>8.1}  {:<9} {:<32} {:<28} {}",
            hit.score,
            hit.kind.as_str(),
            hit.title,
            hit.subtitle,
            hit.location
        );
    }
    if found.truncated {
        println!("(more matches available, raise --limit)");
    }
    Ok(())
}

pub async fn lookup(path: &Path, key: &str, json: bool) -> Result<()> {
    let session = Session::open(path).await?;
    let aggregate = session.aggregate().await?;
    let Some(symbol) = aggregate.lookup_symbol(key) else {
        bail!("Symbol {key:?} not found");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&symbol)?);
        return Ok(());
    }
    if let Some(location) = &symbol.definition {
        println!("definition   {location}");
    }
    if let Some(location) = &symbol.declaration {
        println!("declaration  {location}");
    }
    Ok(())
}

pub async fn watch(path: &Path, compile_commands: Option<&Path>) -> Result<()> {
    let session = Session::open(path).await?;
    let build_system = session.build_system(compile_commands).await?;
    let aggregate = session.aggregate().await?;

    let scheduler =
        ReindexScheduler::start(session.scheduler_context(build_system), &session.config)?;
    let mut events = scheduler.executor().subscribe();
    let follower = aggregate.follow(scheduler.executor().subscribe());
    let mut status = scheduler.status_stream();
    scheduler.trigger_full("startup").await?;
    println!("Watching {} (Ctrl-C to stop)", session.root.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(DirectoryEvent::Indexed { source_dir, stats, .. }) => println!(
                    "indexed  {} ({} files, {} names)",
                    relative(&session.root, &source_dir),
                    stats.files,
                    stats.names
                ),
                Ok(DirectoryEvent::Removed { source_dir, .. }) => {
                    println!("removed  {}", relative(&session.root, &source_dir));
                }
                Ok(DirectoryEvent::Failed { source_dir, error }) => {
                    eprintln!("failed   {}: {error}", relative(&session.root, &source_dir));
                }
                Err(RecvError::Lagged(skipped)) => log::debug!("Skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if let Some(error) = &current.last_error {
                    log::warn!("Last re-index failed: {error}");
                }
                log::debug!("Scheduler: {current:?}");
            }
        }
    }

    scheduler.shutdown();
    follower.abort();
    println!(
        "Stopped; {} directory indexes loaded",
        aggregate.directory_count()
    );
    Ok(())
}
