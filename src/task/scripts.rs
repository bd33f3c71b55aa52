//! Script compilation through the TypeScript compiler.
//!
//! The project is compiled as a single unit with `tsc` so cross-file
//! type checking matches what the editor reports. In production every
//! emitted file is then rewritten by `esbuild`, which minifies it and
//! drops `console` and `debugger` statements. Both binaries are expected
//! on `PATH`; a missing binary is fatal, a diagnostic from either tool
//! is logged and recoverable.

use std::fs;
use std::process::{Command, Stdio};
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;

use crate::config::Project;
use crate::error::MatchError;
use crate::matcher::FileSet;
use crate::task::{Context, Outcome, Summary, Task, TaskResult, as_overhead};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Couldn't execute the compiler process.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Error during esbuild execution.\n{0}")]
    Esbuild(String),

    #[error("Couldn't read the process output as UTF-8.\n{0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Compiles the TypeScript sources into the output tree. Declaration
/// files type-check the project but never produce output of their own.
pub struct Scripts {
    sources: FileSet,
}

impl Scripts {
    pub fn new(project: &Project) -> Result<Self, MatchError> {
        // Declarations emit nothing, but an edit to one still changes
        // what the compiler sees, so the profile keeps them.
        Ok(Self {
            sources: FileSet::new([project.src_glob("**/*.ts")])?,
        })
    }
}

impl Task for Scripts {
    fn name(&self) -> &'static str {
        "compile-ts"
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let s = Instant::now();
        let project = ctx.project;

        let clean = run_tsc(project)?;

        // Outputs tsc just emitted, mapped from the source files.
        let emitted: Vec<Utf8PathBuf> = self
            .sources
            .walk()?
            .iter()
            .filter(|source| !is_declaration(source))
            .filter_map(|source| Some(project.dest_for(source)?.with_extension("js")))
            .filter(|dest| dest.is_file())
            .collect();

        let mut summary = match project.mode.is_production() {
            true => {
                let outcomes: Vec<Outcome> = emitted
                    .par_iter()
                    .map(|dest| match minify_in_place(dest) {
                        Ok(()) => Outcome::Processed,
                        Err(err) => {
                            tracing::error!("{dest}: {err}");
                            Outcome::Failed
                        }
                    })
                    .collect();
                Summary::collect(outcomes)
            }
            false => Summary::processed(emitted.len()),
        };

        if !clean {
            summary.failed += 1;
        }

        tracing::info!("Compiled {} scripts {}", summary.processed, as_overhead(s));
        Ok(summary)
    }

    fn watched(&self) -> Option<&FileSet> {
        Some(&self.sources)
    }

    fn target(&self, ctx: &Context, source: &Utf8Path) -> Option<Utf8PathBuf> {
        if is_declaration(source) {
            return None;
        }
        Some(ctx.project.dest_for(source)?.with_extension("js"))
    }
}

/// `.d.ts` files type-check the project without emitting anything.
fn is_declaration(path: &Utf8Path) -> bool {
    path.as_str().ends_with(".d.ts")
}

/// Runs one whole-project compile. Returns whether tsc finished without
/// diagnostics; files may have been emitted either way.
fn run_tsc(project: &Project) -> Result<bool, ScriptError> {
    let mut command = Command::new("tsc");
    command
        .arg("-p")
        .arg(project.tsconfig().as_str())
        .arg("--outDir")
        .arg(project.dist.as_str());

    if !project.mode.is_production() {
        command.arg("--inlineSourceMap");
    }

    let output = command
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()?;

    if !output.status.success() {
        // tsc prints diagnostics on stdout.
        tracing::error!("tsc reported errors:\n{}", String::from_utf8(output.stdout)?.trim_end());
        return Ok(false);
    }

    Ok(true)
}

/// Minifies one emitted file in place, dropping `console` and `debugger`
/// statements.
fn minify_in_place(file: &Utf8Path) -> Result<(), ScriptError> {
    let output = Command::new("esbuild")
        .arg(file.as_str())
        .arg("--minify")
        .arg("--drop:console")
        .arg("--drop:debugger")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        return Err(ScriptError::Esbuild(String::from_utf8(output.stderr)?));
    }

    fs::write(file, output.stdout)?;
    Ok(())
}
