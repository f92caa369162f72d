//! Built-in lens engine
//!
//! Line-oriented lenses for a handful of common formats. Every lens splits
//! its input into records (one per non-blank line) that remember their
//! exact source text, so `put` can reproduce unchanged records verbatim.

use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, instrument};

use crate::domain::{Fragment, Span, SpanRange, Transform};
use crate::infrastructure::error::LensError;
use crate::infrastructure::traits::LensEngine;

pub mod hosts;
pub mod shellvars;

pub const COMMENT: &str = "#comment";

/// Files no autoloaded transform should pick up.
const DEFAULT_EXCLUDES: [&str; 3] = ["*.augnew", "*.augsave", "*~"];

/// One parsed line and the text it came from, including any blank lines
/// directly before it.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub fragment: Fragment,
    pub text: String,
}

/// Parser output: records plus whatever blank text trails the last record.
#[derive(Debug, Clone, Default)]
pub(crate) struct Parsed {
    pub records: Vec<Record>,
    pub trailer: String,
}

impl Parsed {
    pub fn fragments(&self) -> Vec<Fragment> {
        self.records.iter().map(|r| r.fragment.clone()).collect()
    }
}

/// A single source line with its byte offset and 1-based line number.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    pub text: &'a str,
    pub offset: usize,
    pub number: usize,
    /// Length including the line terminator.
    pub full_len: usize,
}

impl<'a> Line<'a> {
    /// Parse error pointing at byte `col` of this line.
    pub fn error_at(&self, col: usize, message: impl Into<String>) -> LensError {
        LensError::Parse {
            message: message.into(),
            pos: self.offset + col,
            line: self.number,
            char: col + 1,
        }
    }

    pub fn range(&self, start: usize, end: usize) -> SpanRange {
        SpanRange::new(self.offset + start, self.offset + end)
    }
}

pub(crate) fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n').enumerate().map(move |(i, raw)| {
        let line = Line {
            text: raw.trim_end_matches('\n').trim_end_matches('\r'),
            offset,
            number: i + 1,
            full_len: raw.len(),
        };
        offset += raw.len();
        line
    })
}

/// Split `text` into records with `parse_line`; blank lines are attached to
/// the record that follows them.
pub(crate) fn parse_records<F>(text: &str, mut parse_line: F) -> Result<Parsed, LensError>
where
    F: FnMut(&Line<'_>, usize) -> Result<Fragment, LensError>,
{
    let mut parsed = Parsed::default();
    let mut pending = String::new();
    let mut entries = 0;
    for line in lines(text) {
        let raw = &text[line.offset..line.offset + line.full_len];
        if line.text.trim().is_empty() {
            pending.push_str(raw);
            continue;
        }
        let fragment = parse_line(&line, entries)?;
        if fragment.label != COMMENT {
            entries += 1;
        }
        pending.push_str(raw);
        parsed.records.push(Record {
            fragment,
            text: std::mem::take(&mut pending),
        });
    }
    parsed.trailer = pending;
    Ok(parsed)
}

/// `#comment` fragment for a comment line, or `None` if the line is not one.
pub(crate) fn comment_line(line: &Line<'_>) -> Option<Fragment> {
    let start = line.text.len() - line.text.trim_start().len();
    let body = line.text.trim_start().strip_prefix('#')?;
    let value = body.trim();
    let value_start = line.text.len() - body.trim_start().len();
    Some(
        Fragment::new(COMMENT)
            .with_value(value)
            .with_span(Span {
                filename: String::new(),
                label: line.range(start, start),
                value: line.range(value_start, value_start + value.len()),
                node: line.range(start, line.text.len()),
            }),
    )
}

/// Regenerate text from `fragments`, reusing the source text of every
/// record from `original` whose content is unchanged.
pub(crate) fn put_records<F>(
    fragments: &[Fragment],
    original: Option<Parsed>,
    mut render: F,
) -> Result<String, LensError>
where
    F: FnMut(&Fragment) -> Result<String, LensError>,
{
    let Parsed {
        records,
        trailer,
    } = original.unwrap_or_default();
    let mut unused: Vec<Option<Record>> = records.into_iter().map(Some).collect();
    let mut out = String::new();
    for fragment in fragments {
        let reused = unused.iter_mut().find_map(|slot| match slot {
            Some(record) if record.fragment.same_content(fragment) => slot.take(),
            _ => None,
        });
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        match reused {
            Some(record) => out.push_str(&record.text),
            None => {
                out.push_str(&render(fragment)?);
                out.push('\n');
            }
        }
    }
    out.push_str(&trailer);
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Hosts,
    Shellvars,
}

/// Lens engine serving the built-in lenses.
///
/// Lenses are addressed as `Module.lns`, `@Module` or `Module`.
#[derive(Debug, Default)]
pub struct BuiltinLenses {
    search_path: RwLock<Vec<PathBuf>>,
}

impl BuiltinLenses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_path(&self) -> Vec<PathBuf> {
        self.search_path
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn resolve(&self, lens: &str) -> Result<Builtin, LensError> {
        let name = lens.trim();
        if name.is_empty()
            || name != lens
            || name.contains(char::is_whitespace)
            || name.contains("..")
            || name.starts_with('.')
            || name.ends_with('.')
        {
            return Err(LensError::Syntax(lens.to_string()));
        }
        let name = name.trim_start_matches('@');
        let module = match name.split_once('.') {
            Some((module, "lns")) => module,
            Some(_) => return Err(LensError::NotFound(lens.to_string())),
            None => name,
        };
        match module {
            "Hosts" => Ok(Builtin::Hosts),
            "Shellvars" => Ok(Builtin::Shellvars),
            _ => Err(LensError::NotFound(lens.to_string())),
        }
    }
}

impl LensEngine for BuiltinLenses {
    fn check(&self, lens: &str) -> Result<(), LensError> {
        self.resolve(lens).map(|_| ())
    }

    #[instrument(level = "debug", skip(self, text))]
    fn get(&self, lens: &str, text: &str) -> Result<Vec<Fragment>, LensError> {
        let parsed = match self.resolve(lens)? {
            Builtin::Hosts => hosts::parse(text)?,
            Builtin::Shellvars => shellvars::parse(text)?,
        };
        Ok(parsed.fragments())
    }

    #[instrument(level = "debug", skip(self, fragments, original))]
    fn put(&self, lens: &str, fragments: &[Fragment], original: Option<&str>) -> Result<String, LensError> {
        let builtin = self.resolve(lens)?;
        // Original text that no longer parses is ignored and rendered afresh.
        let parse = |text: &str| match builtin {
            Builtin::Hosts => hosts::parse(text).ok(),
            Builtin::Shellvars => shellvars::parse(text).ok(),
        };
        let original = original.and_then(parse);
        match builtin {
            Builtin::Hosts => put_records(fragments, original, hosts::render),
            Builtin::Shellvars => put_records(fragments, original, shellvars::render),
        }
    }

    fn autoload(&self) -> Vec<Transform> {
        let excl: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        let mut hosts = Transform::new("Hosts", "Hosts.lns");
        hosts.include = vec!["/etc/hosts".into()];
        hosts.exclude = excl.clone();

        let mut shellvars = Transform::new("Shellvars", "Shellvars.lns");
        shellvars.include = vec!["/etc/environment".into(), "/etc/default/*".into()];
        shellvars.exclude = excl;

        vec![hosts, shellvars]
    }

    fn set_search_path(&self, paths: &[PathBuf]) {
        debug!("lens search path: {:?}", paths);
        if let Ok(mut current) = self.search_path.write() {
            *current = paths.to_vec();
        }
    }
}
