use std::fs;
use std::time::Instant;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::VENDOR_DIR;
use crate::task::{Context, Summary, Task, TaskResult, as_overhead};

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("Couldn't list the output directory.\n{0}")]
    List(std::io::Error),

    #[error("Couldn't remove '{0}'.\n{1}")]
    Remove(Utf8PathBuf, std::io::Error),

    #[error("Couldn't create the output directory.\n{0}")]
    Create(std::io::Error),
}

/// Deletes everything under the output root except the packaged
/// dependencies in `miniprogram_npm/`, then makes sure the root itself
/// exists. Never touches anything outside the output tree.
pub struct Clean;

impl Task for Clean {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let s = Instant::now();
        let removed = clear_dist(ctx)?;
        tracing::info!("Cleaned the output directory {}", as_overhead(s));
        Ok(Summary::processed(removed))
    }
}

fn clear_dist(ctx: &Context) -> Result<usize, CleanError> {
    let dist = &ctx.project.dist;

    if !dist.exists() {
        fs::create_dir_all(dist).map_err(CleanError::Create)?;
        return Ok(0);
    }

    let mut removed = 0;

    for entry in dist.read_dir_utf8().map_err(CleanError::List)? {
        let entry = entry.map_err(CleanError::List)?;

        if entry.file_name() == VENDOR_DIR {
            continue;
        }

        let path = entry.path();
        let result = match entry.file_type().map_err(CleanError::List)?.is_dir() {
            true => fs::remove_dir_all(path),
            false => fs::remove_file(path),
        };
        result.map_err(|err| CleanError::Remove(path.to_path_buf(), err))?;

        removed += 1;
    }

    Ok(removed)
}
