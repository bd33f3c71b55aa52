//! Units of work over the source tree.
//!
//! Each task reads its inputs, applies one transformation and writes the
//! result; ordering between tasks is expressed only through pipeline
//! composition, never inside a task. A broken input file is logged and
//! counted, and the task moves on to the next file.

use std::fmt::Display;
use std::fs;
use std::io;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;

use crate::config::Project;
use crate::matcher::FileSet;

pub mod clean;
pub mod copy;
pub mod data;
pub mod images;
pub mod markup;
pub mod pack;
pub mod scripts;
pub mod styles;

/// Result of one task execution. Errors here are fatal to the pipeline;
/// per-file failures are counted in [`Summary`] instead.
pub type TaskResult<T> = anyhow::Result<T>;

/// Everything a task gets to see while running.
pub struct Context<'a> {
    /// Project layout and mode, threaded from startup.
    pub project: &'a Project,
}

/// A named unit of work.
pub trait Task: Send + Sync {
    /// Stable name used in logs, progress messages and the CLI.
    fn name(&self) -> &'static str;

    /// Executes the task once over its current inputs.
    fn run(&self, ctx: &Context) -> TaskResult<Summary>;

    /// Selection profile the watcher re-runs this task for, or `None`
    /// when the task is not watchable.
    fn watched(&self) -> Option<&FileSet> {
        None
    }

    /// Output file written for the given source, if this task owns one.
    /// The watcher uses this to delete the outputs of removed sources.
    fn target(&self, ctx: &Context, source: &Utf8Path) -> Option<Utf8PathBuf> {
        let _ = (ctx, source);
        None
    }
}

/// What happened to a single file inside a task.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome {
    Processed,
    Skipped,
    Failed,
}

/// Outcome counters for one task run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Files transformed and written.
    pub processed: usize,
    /// Files intentionally left alone, e.g. already current.
    pub skipped: usize,
    /// Files that failed and were logged.
    pub failed: usize,
}

impl Summary {
    pub(crate) fn processed(count: usize) -> Self {
        Self {
            processed: count,
            ..Default::default()
        }
    }

    pub(crate) fn collect(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Processed => summary.processed += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} skipped, {} failed",
            self.processed, self.skipped, self.failed
        )
    }
}

/// Writes an output file, creating parent directories as needed.
pub(crate) fn write_dest(path: &Utf8Path, data: impl AsRef<[u8]>) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, data)
}

const ANSI_BLUE: Style = Style::new().blue();

/// Formats the time elapsed since `s`, e.g. `(+12ms)`.
pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_outcomes() {
        let summary = Summary::collect([
            Outcome::Processed,
            Outcome::Processed,
            Outcome::Skipped,
            Outcome::Failed,
        ]);

        assert_eq!(
            summary,
            Summary {
                processed: 2,
                skipped: 1,
                failed: 1,
            },
        );
        assert_eq!(summary.to_string(), "2 processed, 1 skipped, 1 failed");
    }

    #[test]
    fn write_dest_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let dest = root.join("a/b/c.txt");
        write_dest(&dest, "hello").unwrap();

        assert_eq!(fs::read_to_string(dest).unwrap(), "hello");
    }
}
