use std::env;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::DandoriError;

/// Directory under `dist/` holding packaged npm dependencies. The clean
/// task leaves it alone so a full rebuild doesn't force repackaging.
pub const VENDOR_DIR: &str = "miniprogram_npm";

/// The mode in which the build pipeline is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Development mode, optimized for fast iteration. Output stays
    /// readable and stylesheets get source maps.
    Development,
    /// Production mode, optimized for distribution. Compiled output is
    /// minified.
    Production,
}

impl Mode {
    /// Resolves the mode from `NODE_ENV`. Called exactly once at startup;
    /// the result is threaded through [`Project`] so nothing else reads
    /// the environment.
    pub fn from_env() -> Self {
        match env::var("NODE_ENV") {
            Ok(value) if value == "production" => Mode::Production,
            _ => Mode::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Mode::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

/// Filesystem layout of the project being built, plus the resolved mode.
#[derive(Debug, Clone)]
pub struct Project {
    /// Project root; every other path lives under it.
    pub root: Utf8PathBuf,
    /// Source tree.
    pub src: Utf8PathBuf,
    /// Output tree, mirrored 1:1 from `src`.
    pub dist: Utf8PathBuf,
    /// Scaffolding templates for `create`.
    pub template: Utf8PathBuf,
    /// Build mode, resolved once at startup.
    pub mode: Mode,
}

impl Project {
    pub fn new(root: impl AsRef<Utf8Path>, mode: Mode) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            src: root.join("src"),
            dist: root.join("dist"),
            template: root.join("template"),
            root,
            mode,
        }
    }

    /// Creates a project rooted at the current working directory.
    pub fn locate(mode: Mode) -> Result<Self, DandoriError> {
        let cwd = Utf8PathBuf::try_from(env::current_dir()?)?;
        Ok(Self::new(cwd, mode))
    }

    /// `node_modules/` with the installed dependencies.
    pub fn node_modules(&self) -> Utf8PathBuf {
        self.root.join("node_modules")
    }

    /// The npm manifest consumed for dependency packaging.
    pub fn manifest(&self) -> Utf8PathBuf {
        self.root.join("package.json")
    }

    /// TypeScript project configuration.
    pub fn tsconfig(&self) -> Utf8PathBuf {
        self.root.join("tsconfig.json")
    }

    /// Packaged dependencies inside the output tree.
    pub fn vendor(&self) -> Utf8PathBuf {
        self.dist.join(VENDOR_DIR)
    }

    /// Source images, compressed in place.
    pub fn images(&self) -> Utf8PathBuf {
        self.src.join("assets").join("images")
    }

    /// Cache for build artifacts that survive `clean`.
    pub fn cache(&self) -> Utf8PathBuf {
        self.root.join(".cache")
    }

    /// Builds a glob pattern rooted at the source tree.
    pub fn src_glob(&self, suffix: &str) -> String {
        format!("{}/{}", self.src, suffix)
    }

    /// Maps a source file to its 1:1 counterpart in the output tree.
    /// Returns `None` for paths outside the source tree.
    pub fn dest_for(&self, source: &Utf8Path) -> Option<Utf8PathBuf> {
        let rel = source.strip_prefix(&self.src).ok()?;
        Some(self.dist.join(rel))
    }
}
