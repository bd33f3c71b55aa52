//! Watch mode: debounced filesystem events re-run the affected tasks.
//!
//! One subscription pairs a task with its selection profile. Each
//! subscription owns a worker thread fed through a channel, so re-runs
//! of the same task are serialized in arrival order while different
//! tasks run concurrently. Removing a source file also removes the file
//! it produced in the output tree before the re-run is queued.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::sync::mpsc::{Sender, channel};
use std::thread::JoinHandle;
use std::time::Duration;

use camino::Utf8Path;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::new_debouncer;
use tracing::Level;

use crate::config::Project;
use crate::error::WatchError;
use crate::pipeline::{Registry, TaskId};
use crate::task::{Context, Task};

/// Tasks re-run on source changes, in subscription order.
pub const WATCHED_TASKS: &[TaskId] = &[TaskId::Styles, TaskId::Scripts, TaskId::Copy];

/// Events arriving within this window are batched into one dispatch.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// A task wired to its worker thread. Dropping the subscription closes
/// the queue, which lets the worker drain and exit.
struct Subscription {
    id: TaskId,
    task: Arc<dyn Task>,
    queue: Sender<()>,
    _worker: JoinHandle<()>,
}

/// Installs subscriptions for `tasks` and blocks, re-running each task
/// whenever matching files change. Returns only on watcher failure.
pub fn run(project: &Project, registry: &Registry, tasks: &[TaskId]) -> Result<(), WatchError> {
    let mut subscriptions = Vec::new();
    for &id in tasks {
        let Some(task) = registry.get(id) else {
            return Err(WatchError::NotWatchable(id.as_str()));
        };
        if task.watched().is_none() {
            return Err(WatchError::NotWatchable(id.as_str()));
        }
        subscriptions.push(subscribe(id, Arc::clone(task), project.clone()));
    }

    let (tx, rx) = channel();
    let mut debouncer = new_debouncer(DEBOUNCE, None, tx)?;
    debouncer.watch(project.src.as_std_path(), RecursiveMode::Recursive)?;

    tracing::info!("Watching {} for changes", project.src);

    let ctx = Context { project };

    loop {
        match rx.recv()? {
            Ok(events) => {
                let mut dirty: HashSet<TaskId> = HashSet::new();

                for event in events
                    .iter()
                    .filter(|de| {
                        matches!(
                            de.event.kind,
                            EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                        )
                    })
                {
                    let kind = describe(&event.event.kind);

                    for path in &event.event.paths {
                        let Some(path) = Utf8Path::from_path(path) else {
                            continue;
                        };

                        tracing::info!("[watch] {}: {kind}", display_path(project, path));

                        for sub in &subscriptions {
                            let Some(files) = sub.task.watched() else {
                                continue;
                            };
                            if !files.matches(path) {
                                continue;
                            }

                            // A removed source also loses its output file;
                            // the re-run is queued either way.
                            if let EventKind::Remove(..) = event.event.kind {
                                remove_target(&ctx, sub, path);
                            }
                            dirty.insert(sub.id);
                        }
                    }
                }

                // One signal per dirty task, regardless of how many of
                // its files changed in the batch.
                for sub in &subscriptions {
                    if dirty.contains(&sub.id) {
                        sub.queue.send(())?;
                    }
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::error!("Watch error: {error}");
                }
            }
        }
    }
}

/// Spawns the worker thread that serializes runs of one task.
fn subscribe(id: TaskId, task: Arc<dyn Task>, project: Project) -> Subscription {
    let (tx, rx) = channel::<()>();
    let worker_task = Arc::clone(&task);

    let worker = std::thread::spawn(move || {
        let ctx = Context { project: &project };

        while rx.recv().is_ok() {
            let span = tracing::span!(Level::INFO, "task", name = id.as_str());
            let _enter = span.enter();

            match worker_task.run(&ctx) {
                Ok(summary) => tracing::info!("{id}: {summary}"),
                Err(err) => tracing::error!("{id}: {err}"),
            }
        }
    });

    Subscription {
        id,
        task,
        queue: tx,
        _worker: worker,
    }
}

/// Deletes the output of a removed source, if the task maps one.
fn remove_target(ctx: &Context, sub: &Subscription, source: &Utf8Path) {
    let Some(dest) = sub.task.target(ctx, source) else {
        return;
    };

    if dest.exists() {
        match fs::remove_file(&dest) {
            Ok(()) => tracing::info!("[watch] removed {dest}"),
            Err(err) => tracing::error!("[watch] couldn't remove {dest}: {err}"),
        }
    }
}

fn display_path<'a>(project: &Project, path: &'a Utf8Path) -> &'a Utf8Path {
    path.strip_prefix(&project.root).unwrap_or(path)
}

fn describe(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Create(..) => "created",
        EventKind::Modify(..) => "modified",
        EventKind::Remove(..) => "removed",
        _ => "changed",
    }
}
