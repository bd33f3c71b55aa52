use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::changed;
use crate::config::Project;
use crate::error::MatchError;
use crate::matcher::FileSet;
use crate::task::{Context, Outcome, Summary, Task, TaskResult, as_overhead};

/// Copies every source file that no compiler owns into the output tree,
/// preserving relative paths. Stylesheets and scripts are excluded; their
/// compiling tasks write the corresponding outputs. `_` partials never
/// ship.
pub struct Copy {
    files: FileSet,
    changed_only: bool,
}

impl Copy {
    /// Full copy of all owned files.
    pub fn new(project: &Project) -> Result<Self, MatchError> {
        Ok(Self {
            files: profile(project)?,
            changed_only: false,
        })
    }

    /// Incremental variant that skips files whose output is already as
    /// new as the source.
    pub fn changed(project: &Project) -> Result<Self, MatchError> {
        Ok(Self {
            files: profile(project)?,
            changed_only: true,
        })
    }

    fn copy_one(&self, ctx: &Context, source: &Utf8Path) -> Outcome {
        let Some(dest) = ctx.project.dest_for(source) else {
            return Outcome::Skipped;
        };

        if self.changed_only {
            match changed::is_stale(source, &dest) {
                Ok(true) => {}
                Ok(false) => return Outcome::Skipped,
                Err(err) => {
                    tracing::error!("{source}: {err}");
                    return Outcome::Failed;
                }
            }
        }

        match copy_file(source, &dest) {
            Ok(()) => Outcome::Processed,
            Err(err) => {
                tracing::error!("{source}: {err}");
                Outcome::Failed
            }
        }
    }
}

fn profile(project: &Project) -> Result<FileSet, MatchError> {
    Ok(FileSet::new([
        project.src_glob("**/*"),
        format!("!{}", project.src_glob("**/*.scss")),
        format!("!{}", project.src_glob("**/*.ts")),
    ])?
    .skip_partials())
}

fn copy_file(source: &Utf8Path, dest: &Utf8Path) -> std::io::Result<()> {
    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::copy(source, dest)?;
    Ok(())
}

impl Task for Copy {
    fn name(&self) -> &'static str {
        match self.changed_only {
            true => "copyChange",
            false => "copy",
        }
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let s = Instant::now();
        let files = self.files.walk()?;

        let outcomes: Vec<Outcome> = files
            .par_iter()
            .map(|source| self.copy_one(ctx, source))
            .collect();

        let summary = Summary::collect(outcomes);
        tracing::info!("Copied {} files {}", summary.processed, as_overhead(s));
        Ok(summary)
    }

    fn watched(&self) -> Option<&FileSet> {
        Some(&self.files)
    }

    fn target(&self, ctx: &Context, source: &Utf8Path) -> Option<Utf8PathBuf> {
        ctx.project.dest_for(source)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{File, FileTimes};
    use std::time::{Duration, SystemTime};

    use camino::Utf8PathBuf;

    use crate::config::Mode;

    use super::*;

    fn project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, Project::new(root, Mode::Development))
    }

    fn touch(path: &Utf8Path, data: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    fn set_mtime(path: &Utf8Path, mtime: SystemTime) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(mtime)).unwrap();
    }

    #[test]
    fn copies_everything_except_compiled_sources() {
        let (_dir, project) = project();
        touch(&project.src.join("app.json"), "{}");
        touch(&project.src.join("pages/home/home.wxml"), "<view/>");
        touch(&project.src.join("pages/home/home.scss"), ".a{}");
        touch(&project.src.join("pages/home/home.ts"), "export {}");

        let copy = Copy::new(&project).unwrap();
        let summary = copy.run(&Context { project: &project }).unwrap();

        assert!(project.dist.join("app.json").exists());
        assert!(project.dist.join("pages/home/home.wxml").exists());
        // Compiled sources belong to their own tasks.
        assert!(!project.dist.join("pages/home/home.scss").exists());
        assert!(!project.dist.join("pages/home/home.ts").exists());
        assert_eq!(summary.processed, 2);
    }

    #[test]
    fn incremental_copy_skips_current_outputs() {
        let (_dir, project) = project();
        let base = SystemTime::now();

        let fresh = project.src.join("fresh.json");
        let stale = project.src.join("stale.json");
        touch(&fresh, "new");
        touch(&stale, "old");

        // `fresh` already has an up-to-date output, `stale` has an older one.
        touch(&project.dist.join("fresh.json"), "copied");
        touch(&project.dist.join("stale.json"), "copied");
        set_mtime(&fresh, base);
        set_mtime(&project.dist.join("fresh.json"), base + Duration::from_secs(5));
        set_mtime(&stale, base + Duration::from_secs(10));
        set_mtime(&project.dist.join("stale.json"), base);

        let copy = Copy::changed(&project).unwrap();
        let summary = copy.run(&Context { project: &project }).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(fs::read_to_string(project.dist.join("fresh.json")).unwrap(), "copied");
        assert_eq!(fs::read_to_string(project.dist.join("stale.json")).unwrap(), "old");
    }

    #[test]
    fn partials_stay_out_of_the_output_tree() {
        let (_dir, project) = project();
        touch(&project.src.join("pages/home/home.wxml"), "<view/>");
        touch(&project.src.join("pages/home/_draft.wxml"), "<view/>");

        let copy = Copy::new(&project).unwrap();
        copy.run(&Context { project: &project }).unwrap();

        assert!(project.dist.join("pages/home/home.wxml").exists());
        assert!(!project.dist.join("pages/home/_draft.wxml").exists());
        // The watcher consults the same profile, so an event on a
        // partial is ignored rather than copied.
        let profile = copy.watched().unwrap();
        assert!(!profile.matches(&project.src.join("pages/home/_draft.wxml")));
    }

    #[test]
    fn maps_watch_targets_into_the_output_tree() {
        let (_dir, project) = project();
        let copy = Copy::new(&project).unwrap();
        let ctx = Context { project: &project };

        let source = project.src.join("pages/a.wxml");
        assert_eq!(copy.target(&ctx, &source), Some(project.dist.join("pages/a.wxml")));
        assert_eq!(copy.target(&ctx, "/outside/a.wxml".into()), None);
    }
}
