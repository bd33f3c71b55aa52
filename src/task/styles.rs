//! Stylesheet compilation, SCSS in and WXSS out.
//!
//! Entry points are the `.scss` files not prefixed with `_`; partials
//! only ever reach the output through an `@use` or `@import` from an
//! entry point. After compilation every `px` length is doubled into
//! `rpx`, the responsive unit of the mini-program runtime, and flexbox
//! and transform declarations get a `-webkit-` twin for the older
//! WebViews still embedding mini-programs.

use std::sync::LazyLock;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use regex::{Captures, Regex};
use serde::Serialize;
use thiserror::Error;

use crate::config::{Mode, Project};
use crate::error::MatchError;
use crate::matcher::FileSet;
use crate::task::{Context, Outcome, Summary, Task, TaskResult, as_overhead, write_dest};

#[derive(Debug, Error)]
pub enum StyleError {
    #[error("Couldn't read or write the stylesheet.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't compile the stylesheet.\n{0}")]
    Compile(#[from] Box<grass::Error>),

    #[error("Couldn't serialize the source map.\n{0}")]
    Map(#[from] serde_json::Error),
}

/// Compiles `.scss` entry points into `.wxss` files in the output tree.
/// Production output is compressed; development output stays expanded and
/// gets an external source map next to each file.
pub struct Styles {
    entries: FileSet,
}

impl Styles {
    pub fn new(project: &Project) -> Result<Self, MatchError> {
        Ok(Self {
            entries: FileSet::new([project.src_glob("**/*.scss")])?.skip_partials(),
        })
    }

    fn compile_one(&self, ctx: &Context, source: &Utf8Path) -> Result<Outcome, StyleError> {
        let project = ctx.project;
        let Some(dest) = target_path(project, source) else {
            return Ok(Outcome::Skipped);
        };

        let style = match project.mode {
            Mode::Production => grass::OutputStyle::Compressed,
            Mode::Development => grass::OutputStyle::Expanded,
        };

        let css = grass::from_path(source, &grass::Options::default().style(style))?;
        let css = convert_px_to_rpx(&css);
        let mut css = prefix_webkit(&css);

        if !project.mode.is_production() {
            let map_path = Utf8PathBuf::from(format!("{dest}.map"));
            write_dest(&map_path, source_map(project, source, &dest)?)?;

            if let Some(map_name) = map_path.file_name() {
                css.push_str("\n/*# sourceMappingURL=");
                css.push_str(map_name);
                css.push_str(" */\n");
            }
        }

        write_dest(&dest, css)?;
        Ok(Outcome::Processed)
    }
}

fn target_path(project: &Project, source: &Utf8Path) -> Option<Utf8PathBuf> {
    Some(project.dest_for(source)?.with_extension("wxss"))
}

impl Task for Styles {
    fn name(&self) -> &'static str {
        "compile-less"
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let s = Instant::now();
        let entries = self.entries.walk()?;

        let outcomes: Vec<Outcome> = entries
            .par_iter()
            .map(|source| match self.compile_one(ctx, source) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!("{source}: {err}");
                    Outcome::Failed
                }
            })
            .collect();

        let summary = Summary::collect(outcomes);
        tracing::info!("Compiled {} stylesheets {}", summary.processed, as_overhead(s));
        Ok(summary)
    }

    fn watched(&self) -> Option<&FileSet> {
        Some(&self.entries)
    }

    fn target(&self, ctx: &Context, source: &Utf8Path) -> Option<Utf8PathBuf> {
        target_path(ctx.project, source)
    }
}

/// A `px` length in declaration value position: preceded by `:`, `(`,
/// `,` or whitespace, so lengths baked into selector names like
/// `.mt-16px` stay untouched.
static PX_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<pre>[:\s,(])(?P<value>-?\d+(?:\.\d+)?)px\b")
        .expect("Error compiling px pattern")
});

/// Doubles every `px` length into `rpx`. On the mini-program reference
/// viewport one CSS pixel equals two responsive pixels.
pub(crate) fn convert_px_to_rpx(css: &str) -> String {
    PX_VALUE
        .replace_all(css, |caps: &Captures| {
            let value: f64 = caps["value"].parse().unwrap_or(0.0);
            format!("{}{}rpx", &caps["pre"], value * 2.0)
        })
        .into_owned()
}

static DISPLAY_FLEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"display\s*:\s*(?P<inline>inline-)?flex\b")
        .expect("Error compiling flex pattern")
});

static PREFIXED_PROP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<pre>^|[;{}\s])(?P<prop>transform|transition|animation)\s*:(?P<value>[^;}]*)")
        .expect("Error compiling prefix pattern")
});

/// Duplicates flexbox and transform declarations with a `-webkit-`
/// prefix. Declarations already carrying a vendor prefix are left alone.
pub(crate) fn prefix_webkit(css: &str) -> String {
    let css = DISPLAY_FLEX.replace_all(css, "display:-webkit-${inline}flex;display:${inline}flex");
    PREFIXED_PROP
        .replace_all(&css, "${pre}-webkit-${prop}:${value};${prop}:${value}")
        .into_owned()
}

#[derive(Serialize)]
struct SourceMap {
    version: u8,
    file: String,
    sources: Vec<String>,
    names: Vec<String>,
    mappings: &'static str,
}

/// A whole-file source map: it points the debugger at the original
/// `.scss` file without tracking individual rules.
fn source_map(project: &Project, source: &Utf8Path, dest: &Utf8Path) -> Result<String, StyleError> {
    let depth = dest
        .parent()
        .and_then(|dir| dir.strip_prefix(&project.root).ok())
        .map(|rel| rel.components().count())
        .unwrap_or(0);

    let rel_source = source.strip_prefix(&project.root).unwrap_or(source);

    let map = SourceMap {
        version: 3,
        file: dest.file_name().unwrap_or_default().to_string(),
        sources: vec![format!("{}{}", "../".repeat(depth), rel_source)],
        names: Vec::new(),
        mappings: "AAAA",
    };

    Ok(serde_json::to_string(&map)?)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;

    fn project(mode: Mode) -> (tempfile::TempDir, Project) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, Project::new(root, mode))
    }

    #[test]
    fn px_lengths_double_into_rpx() {
        assert_eq!(convert_px_to_rpx(".a{width:16px}"), ".a{width:32rpx}");
        assert_eq!(convert_px_to_rpx(".a{margin:0 4px 1.5px}"), ".a{margin:0 8rpx 3rpx}");
        assert_eq!(convert_px_to_rpx(".a{margin:-4px}"), ".a{margin:-8rpx}");
        assert_eq!(convert_px_to_rpx(".a{width:calc(100% - 10px)}"), ".a{width:calc(100% - 20rpx)}");
        // Expanded output keeps the space after the colon.
        assert_eq!(convert_px_to_rpx(".a {\n  width: 16px;\n}"), ".a {\n  width: 32rpx;\n}");
    }

    #[test]
    fn px_in_names_is_not_a_length() {
        assert_eq!(convert_px_to_rpx(".mt-16px{margin-top:16px}"), ".mt-16px{margin-top:32rpx}");
        assert_eq!(
            convert_px_to_rpx(".a{background:url(logo2px.png)}"),
            ".a{background:url(logo2px.png)}",
        );
    }

    #[test]
    fn flex_display_gains_a_webkit_twin() {
        assert_eq!(
            prefix_webkit(".a{display:flex}"),
            ".a{display:-webkit-flex;display:flex}",
        );
        assert_eq!(
            prefix_webkit(".a{display:inline-flex}"),
            ".a{display:-webkit-inline-flex;display:inline-flex}",
        );
        // Unrelated display values stay as they are.
        assert_eq!(prefix_webkit(".a{display:block}"), ".a{display:block}");
    }

    #[test]
    fn transform_properties_gain_a_webkit_twin() {
        assert_eq!(
            prefix_webkit(".a{transform:scale(2)}"),
            ".a{-webkit-transform:scale(2);transform:scale(2)}",
        );
        assert_eq!(
            prefix_webkit(".a{transition:opacity .3s;color:red}"),
            ".a{-webkit-transition:opacity .3s;transition:opacity .3s;color:red}",
        );
        // Longhands such as animation-name are different properties.
        assert_eq!(
            prefix_webkit(".a{animation-name:spin}"),
            ".a{animation-name:spin}",
        );
        // Already prefixed declarations must not be doubled up.
        assert_eq!(
            prefix_webkit(".a{-webkit-transform:none}"),
            ".a{-webkit-transform:none}",
        );
    }

    #[test]
    fn production_output_is_compressed() {
        let (_dir, project) = project(Mode::Production);
        fs::create_dir_all(project.src.join("pages")).unwrap();
        fs::write(
            project.src.join("pages/home.scss"),
            "$w: 16px;\n.btn {\n  .inner {\n    width: $w;\n  }\n}\n",
        )
        .unwrap();

        let task = Styles::new(&project).unwrap();
        let summary = task.run(&Context { project: &project }).unwrap();

        let output = fs::read_to_string(project.dist.join("pages/home.wxss")).unwrap();
        assert_eq!(summary.processed, 1);
        // Nesting is resolved and the length is converted.
        assert!(output.contains(".btn .inner"));
        assert!(output.contains("32rpx"));
        // Compressed output carries no indentation.
        assert!(!output.contains("\n  "));
        // No source map in production.
        assert!(!project.dist.join("pages/home.wxss.map").exists());
        assert!(!output.contains("sourceMappingURL"));
    }

    #[test]
    fn development_output_gets_a_source_map() {
        let (_dir, project) = project(Mode::Development);
        fs::create_dir_all(project.src.join("pages")).unwrap();
        fs::write(project.src.join("pages/home.scss"), ".btn { width: 8px; }\n").unwrap();

        let task = Styles::new(&project).unwrap();
        task.run(&Context { project: &project }).unwrap();

        let output = fs::read_to_string(project.dist.join("pages/home.wxss")).unwrap();
        assert!(output.contains("16rpx"));
        assert!(output.contains("/*# sourceMappingURL=home.wxss.map */"));

        let map: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(project.dist.join("pages/home.wxss.map")).unwrap())
                .unwrap();
        assert_eq!(map["version"], 3);
        assert_eq!(map["file"], "home.wxss");
        assert_eq!(map["sources"][0], "../../src/pages/home.scss");
    }

    #[test]
    fn partials_are_not_entry_points() {
        let (_dir, project) = project(Mode::Production);
        fs::create_dir_all(&project.src).unwrap();
        fs::write(project.src.join("_vars.scss"), "$w: 4px;\n").unwrap();
        fs::write(project.src.join("app.scss"), "@import \"vars\";\n.a { width: $w; }\n").unwrap();

        let task = Styles::new(&project).unwrap();
        let summary = task.run(&Context { project: &project }).unwrap();

        assert_eq!(summary.processed, 1);
        assert!(project.dist.join("app.wxss").exists());
        // The partial reaches the output only through its importer.
        assert!(!project.dist.join("_vars.wxss").exists());
        assert!(fs::read_to_string(project.dist.join("app.wxss")).unwrap().contains("8rpx"));
    }

    #[test]
    fn broken_stylesheets_fail_without_stopping_the_task() {
        let (_dir, project) = project(Mode::Production);
        fs::create_dir_all(&project.src).unwrap();
        fs::write(project.src.join("bad.scss"), ".a { color: }\n").unwrap();
        fs::write(project.src.join("good.scss"), ".b { width: 1px; }\n").unwrap();

        let task = Styles::new(&project).unwrap();
        let summary = task.run(&Context { project: &project }).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert!(project.dist.join("good.wxss").exists());
        assert!(!project.dist.join("bad.wxss").exists());
    }
}
