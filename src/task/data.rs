//! JSON minification.
//!
//! The minifier strips insignificant whitespace plus `//` and `/* */`
//! comments while leaving string contents untouched. The text is never
//! parsed into a tree, so key order and number formatting survive as
//! written and the operation is idempotent.

use std::fs;
use std::time::Instant;

use camino::Utf8Path;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::config::Project;
use crate::error::MatchError;
use crate::matcher::FileSet;
use crate::task::{Context, Outcome, Summary, Task, TaskResult, as_overhead, write_dest};

/// Minifies every `.json` file under the source tree into the output
/// tree. Runs in every mode; configuration files are never debugged
/// through the output the way scripts are.
pub struct Data {
    files: FileSet,
}

impl Data {
    pub fn new(project: &Project) -> Result<Self, MatchError> {
        Ok(Self {
            files: FileSet::new([project.src_glob("**/*.json")])?,
        })
    }

    fn minify_one(&self, ctx: &Context, source: &Utf8Path) -> Outcome {
        let Some(dest) = ctx.project.dest_for(source) else {
            return Outcome::Skipped;
        };

        let result = fs::read_to_string(source)
            .and_then(|text| write_dest(&dest, minify_json(&text)));

        match result {
            Ok(()) => Outcome::Processed,
            Err(err) => {
                tracing::error!("{source}: {err}");
                Outcome::Failed
            }
        }
    }
}

impl Task for Data {
    fn name(&self) -> &'static str {
        "minify-json"
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let s = Instant::now();
        let files = self.files.walk()?;

        let outcomes: Vec<Outcome> = files
            .par_iter()
            .map(|source| self.minify_one(ctx, source))
            .collect();

        let summary = Summary::collect(outcomes);
        tracing::info!("Minified {} data files {}", summary.processed, as_overhead(s));
        Ok(summary)
    }
}

/// Removes whitespace and comments outside string literals.
pub(crate) fn minify_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                // Escapes pass through whole so \" can't end the string.
                '\\' => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            c if c.is_whitespace() => {}
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use crate::config::Mode;

    use super::*;

    #[test]
    fn strips_whitespace_outside_strings() {
        let input = "{\n  \"name\": \"demo app\",\n  \"pages\": [ \"a\", \"b\" ]\n}\n";
        assert_eq!(
            minify_json(input),
            r#"{"name":"demo app","pages":["a","b"]}"#,
        );
    }

    #[test]
    fn string_contents_survive() {
        // Escaped quotes and backslashes must not end the string early.
        let input = r#"{ "msg": "he said \"hi\"", "path": "a\\b c" }"#;
        assert_eq!(
            minify_json(input),
            r#"{"msg":"he said \"hi\"","path":"a\\b c"}"#,
        );
    }

    #[test]
    fn comments_are_removed() {
        let input = "{\n  // window settings\n  \"n\": 1, /* inline */ \"m\": 2\n}";
        assert_eq!(minify_json(input), r#"{"n":1,"m":2}"#);
    }

    #[test]
    fn slashes_inside_strings_are_data() {
        let input = r#"{ "url": "https://example.test/a" }"#;
        assert_eq!(minify_json(input), r#"{"url":"https://example.test/a"}"#);
    }

    #[test]
    fn minification_is_idempotent() {
        let once = minify_json("{ \"a\": [1, 2, 3] } // t\n");
        assert_eq!(minify_json(&once), once);
    }

    #[test]
    fn writes_into_the_output_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let project = crate::config::Project::new(root, Mode::Development);

        fs::create_dir_all(&project.src).unwrap();
        fs::write(project.src.join("app.json"), "{ \"pages\": [] }\n").unwrap();

        let task = Data::new(&project).unwrap();
        let summary = task.run(&Context { project: &project }).unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(
            fs::read_to_string(project.dist.join("app.json")).unwrap(),
            r#"{"pages":[]}"#,
        );
    }
}
