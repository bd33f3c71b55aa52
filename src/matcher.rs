//! Glob-based selection of source files.
//!
//! Every task describes its inputs as a [`FileSet`]: positive glob
//! patterns, negative patterns prefixed with `!`, an optional extension
//! whitelist and an optional rule skipping `_`-prefixed partials. One
//! profile drives both the directory walk when a task runs and the pure
//! single-path check when the watcher routes an event, so the two can
//! never disagree about which files a task owns.

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};

use crate::error::MatchError;

/// Options shared by walking and event matching. Separators have to be
/// matched literally so `src/*.json` can't reach into subdirectories.
const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A reusable selection profile over the source tree.
#[derive(Debug, Clone)]
pub struct FileSet {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    extensions: Vec<&'static str>,
    skip_partials: bool,
}

impl FileSet {
    /// Compiles a profile from glob patterns. A `!` prefix marks a
    /// negation; a file is selected when it matches at least one positive
    /// pattern and no negative one.
    pub fn new<I, S>(patterns: I) -> Result<Self, MatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(negated) => exclude.push(Pattern::new(negated)?),
                None => include.push(Pattern::new(pattern)?),
            }
        }

        Ok(Self {
            include,
            exclude,
            extensions: Vec::new(),
            skip_partials: false,
        })
    }

    /// Restricts matches to the given extensions, compared without case.
    pub fn extensions(mut self, extensions: &[&'static str]) -> Self {
        self.extensions = extensions.to_vec();
        self
    }

    /// Skips files whose name starts with `_`, the partial convention.
    pub fn skip_partials(mut self) -> Self {
        self.skip_partials = true;
        self
    }

    /// Tests a single path against the profile without touching the
    /// filesystem.
    pub fn matches(&self, path: &Utf8Path) -> bool {
        let candidate = path.as_std_path();

        if !self.include.iter().any(|p| p.matches_path_with(candidate, OPTIONS)) {
            return false;
        }

        if self.exclude.iter().any(|p| p.matches_path_with(candidate, OPTIONS)) {
            return false;
        }

        self.matches_name(path)
    }

    /// The extension and partial rules, shared by both entry points.
    fn matches_name(&self, path: &Utf8Path) -> bool {
        if !self.extensions.is_empty() {
            let allowed = match path.extension() {
                Some(ext) => self.extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)),
                None => false,
            };
            if !allowed {
                return false;
            }
        }

        if self.skip_partials
            && let Some(name) = path.file_name()
            && name.starts_with('_')
        {
            return false;
        }

        true
    }

    /// Walks the filesystem and returns every file matching the profile,
    /// sorted and deduplicated. Unreadable entries are skipped with a
    /// warning; directories never appear in the result.
    pub fn walk(&self) -> Result<Vec<Utf8PathBuf>, MatchError> {
        let mut found = Vec::new();

        for pattern in &self.include {
            for entry in glob::glob_with(&walk_pattern(pattern), OPTIONS)? {
                let path = match entry {
                    Ok(path) => path,
                    Err(err) => {
                        tracing::warn!("Skipping unreadable entry: {err}");
                        continue;
                    }
                };

                if !path.is_file() {
                    continue;
                }

                let path = Utf8PathBuf::try_from(path)?;

                if self.exclude.iter().any(|p| p.matches_path_with(path.as_std_path(), OPTIONS)) {
                    continue;
                }

                if !self.matches_name(&path) {
                    continue;
                }

                found.push(path);
            }
        }

        found.sort();
        found.dedup();

        Ok(found)
    }
}

/// Enumerating a pattern that ends in `**` yields the directories it
/// expands to, while matching accepts the files beneath them. The walk
/// extends such patterns so both entry points select the same files.
fn walk_pattern(pattern: &Pattern) -> String {
    let pattern = pattern.as_str();
    match pattern.ends_with("**") {
        true => format!("{pattern}/*"),
        false => pattern.to_string(),
    }
}
