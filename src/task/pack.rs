//! Packaging of npm runtime dependencies.
//!
//! The mini-program runtime resolves bare imports against the
//! `miniprogram_npm/` directory in the output tree, so each runtime
//! dependency named in `package.json` is copied there from
//! `node_modules/`. Only the `dependencies` table matters; dev tooling
//! never ships.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Project;
use crate::task::{Context, Summary, Task, TaskResult, as_overhead, write_dest};

#[derive(Debug, Error)]
pub enum PackError {
    #[error("Couldn't read the project manifest.\n{0}")]
    Read(std::io::Error),

    #[error("Couldn't parse the project manifest.\n{0}")]
    Parse(#[from] serde_json::Error),
}

/// The slice of `package.json` this tool consumes and republishes: the
/// `dependencies` table and nothing else. Serializing it back therefore
/// strips scripts, devDependencies and every other field.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// Reads the dependency table from the project manifest.
    pub fn load(project: &Project) -> Result<Self, PackError> {
        let text = fs::read_to_string(project.manifest()).map_err(PackError::Read)?;
        Ok(serde_json::from_str(&text)?)
    }
}

static VENDOR_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] {pos} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("#>-")
});

/// Copies each runtime dependency's tree from `node_modules/` into the
/// reserved vendor directory of the output tree. A dependency missing
/// from `node_modules/` is skipped with a warning.
pub struct Vendor;

impl Task for Vendor {
    fn name(&self) -> &'static str {
        "vendor"
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let s = Instant::now();
        let project = ctx.project;
        let manifest = Manifest::load(project)?;

        let pb = ProgressBar::no_length();
        pb.set_message("Packaging dependencies...");
        pb.set_style(VENDOR_STYLE.clone());

        let node_modules = project.node_modules();
        let vendor = project.vendor();

        let mut summary = Summary::default();
        for name in manifest.dependencies.keys() {
            let source = node_modules.join(name);
            if !source.is_dir() {
                tracing::warn!("Dependency '{name}' is not installed, skipping");
                summary.skipped += 1;
                continue;
            }

            copy_rec(&source, vendor.join(name), &pb)?;
            summary.processed += 1;
        }

        pb.finish_and_clear();
        tracing::info!("Packaged {} dependencies {}", summary.processed, as_overhead(s));
        Ok(summary)
    }
}

fn copy_rec(src: impl AsRef<Path>, dst: impl AsRef<Path>, pb: &ProgressBar) -> std::io::Result<()> {
    fs::create_dir_all(&dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let filetype = entry.file_type()?;
        if filetype.is_dir() {
            copy_rec(entry.path(), dst.as_ref().join(entry.file_name()), pb)?;
        } else {
            fs::copy(entry.path(), dst.as_ref().join(entry.file_name()))?;
            pb.inc(1);
        }
    }
    Ok(())
}

/// Writes a `package.json` at the output root containing only the
/// dependency table, which is all the devtools uploader needs.
pub struct WriteManifest;

impl Task for WriteManifest {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let manifest = Manifest::load(ctx.project)?;
        let json = serde_json::to_string(&manifest)?;
        write_dest(&ctx.project.dist.join("package.json"), json)?;
        Ok(Summary::processed(1))
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use crate::config::Mode;

    use super::*;

    fn project() -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, Project::new(root, Mode::Production))
    }

    const MANIFEST: &str = r#"{
        "name": "demo",
        "version": "1.0.0",
        "scripts": { "build": "never shipped" },
        "dependencies": { "miniprogram-api": "^2.0.0", "missing-lib": "1.0.0" },
        "devDependencies": { "typescript": "^5.0.0" }
    }"#;

    #[test]
    fn manifest_reads_only_dependencies() {
        let (_dir, project) = project();
        fs::write(project.manifest(), MANIFEST).unwrap();

        let manifest = Manifest::load(&project).unwrap();

        assert_eq!(manifest.dependencies.len(), 2);
        assert_eq!(
            manifest.dependencies.get("miniprogram-api").map(String::as_str),
            Some("^2.0.0"),
        );
    }

    #[test]
    fn missing_dependencies_tables_default_to_empty() {
        let (_dir, project) = project();
        fs::write(project.manifest(), r#"{ "name": "demo" }"#).unwrap();

        let manifest = Manifest::load(&project).unwrap();
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn vendor_copies_installed_dependencies() {
        let (_dir, project) = project();
        fs::write(project.manifest(), MANIFEST).unwrap();

        let lib = project.node_modules().join("miniprogram-api");
        fs::create_dir_all(lib.join("lib")).unwrap();
        fs::write(lib.join("index.js"), b"module.exports = 1;").unwrap();
        fs::write(lib.join("lib/util.js"), b"module.exports = 2;").unwrap();

        let summary = Vendor.run(&Context { project: &project }).unwrap();

        // The installed tree is mirrored, the missing one only warned about.
        assert!(project.vendor().join("miniprogram-api/index.js").exists());
        assert!(project.vendor().join("miniprogram-api/lib/util.js").exists());
        assert!(!project.vendor().join("missing-lib").exists());
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn emitted_manifest_contains_only_dependencies() {
        let (_dir, project) = project();
        fs::write(project.manifest(), MANIFEST).unwrap();

        WriteManifest.run(&Context { project: &project }).unwrap();

        let emitted = fs::read_to_string(project.dist.join("package.json")).unwrap();
        assert_eq!(
            emitted,
            r#"{"dependencies":{"miniprogram-api":"^2.0.0","missing-lib":"1.0.0"}}"#,
        );
    }
}
