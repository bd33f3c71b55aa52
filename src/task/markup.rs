//! WXML minification.
//!
//! A conservative single pass: whitespace-only text between tags is
//! dropped, whitespace runs inside text collapse to one space, comments
//! are removed, and everything between `<` and its matching `>` is copied
//! byte for byte. Quoted attribute values may therefore contain `>`,
//! interpolation braces stay untouched and self-closing tags keep their
//! slash, which the mini-program parser requires.

use std::fs;
use std::time::Instant;

use camino::Utf8Path;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::config::Project;
use crate::error::MatchError;
use crate::matcher::FileSet;
use crate::task::{Context, Outcome, Summary, Task, TaskResult, as_overhead, write_dest};

/// Copies every `.wxml` file under the source tree into the output tree,
/// minified in production mode and verbatim otherwise.
pub struct Markup {
    files: FileSet,
}

impl Markup {
    pub fn new(project: &Project) -> Result<Self, MatchError> {
        Ok(Self {
            files: FileSet::new([project.src_glob("**/*.wxml")])?,
        })
    }

    fn emit_one(&self, ctx: &Context, source: &Utf8Path) -> Outcome {
        let Some(dest) = ctx.project.dest_for(source) else {
            return Outcome::Skipped;
        };

        let result = fs::read_to_string(source).and_then(|text| {
            let output = match ctx.project.mode.is_production() {
                true => minify_wxml(&text),
                false => text,
            };
            write_dest(&dest, output)
        });

        match result {
            Ok(()) => Outcome::Processed,
            Err(err) => {
                tracing::error!("{source}: {err}");
                Outcome::Failed
            }
        }
    }
}

impl Task for Markup {
    fn name(&self) -> &'static str {
        "minify-wxml"
    }

    fn run(&self, ctx: &Context) -> TaskResult<Summary> {
        let s = Instant::now();
        let files = self.files.walk()?;

        let outcomes: Vec<Outcome> = files
            .par_iter()
            .map(|source| self.emit_one(ctx, source))
            .collect();

        let summary = Summary::collect(outcomes);
        tracing::info!("Minified {} markup files {}", summary.processed, as_overhead(s));
        Ok(summary)
    }
}

/// Collapses insignificant whitespace and strips `<!-- -->` comments.
pub(crate) fn minify_wxml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut text = String::new();
    let mut i = 0;

    while i < input.len() {
        if input[i..].starts_with("<!--") {
            flush_text(&mut out, &text);
            text.clear();

            match input[i + 4..].find("-->") {
                Some(end) => i += 4 + end + 3,
                // An unterminated comment swallows the rest of the file.
                None => return out,
            }
            continue;
        }

        if input[i..].starts_with('<') {
            flush_text(&mut out, &text);
            text.clear();

            let end = tag_end(&input[i..]);
            out.push_str(&input[i..i + end]);
            i += end;
            continue;
        }

        match input[i..].chars().next() {
            Some(c) => {
                text.push(c);
                i += c.len_utf8();
            }
            None => break,
        }
    }

    flush_text(&mut out, &text);
    out
}

/// Emits a text node with whitespace runs collapsed; nodes that are
/// whitespace only vanish entirely.
fn flush_text(out: &mut String, text: &str) {
    if text.trim().is_empty() {
        return;
    }

    let mut previous_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !previous_space {
                out.push(' ');
            }
            previous_space = true;
        } else {
            out.push(c);
            previous_space = false;
        }
    }
}

/// Byte length of the tag starting at the `<` in `tag[0]`, honoring
/// quoted attribute values. An unterminated tag runs to the end.
fn tag_end(tag: &str) -> usize {
    let mut quote: Option<char> = None;

    for (i, c) in tag.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '>' => return i + 1,
                _ => {}
            },
        }
    }

    tag.len()
}
