//! Shell variable assignment lens (`/etc/environment`, `/etc/default/*`)
//!
//! `export KEY=value` becomes a node `KEY` with the raw value (quotes kept)
//! and a valueless `export` child. A trailing comment becomes a `#comment`
//! child.

use crate::domain::{Fragment, Span};
use crate::infrastructure::error::LensError;
use crate::infrastructure::lenses::{comment_line, parse_records, Line, Parsed, COMMENT};

const EXPORT: &str = "export";

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_key(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Byte offset of a trailing comment, ignoring `#` inside quotes.
/// `'value'  # comment` → offset of `#`; `'val#ue'` → None.
fn trailing_comment(s: &str) -> Option<usize> {
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut prev_ws = false;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'\'' if !in_double_quote => in_single_quote = !in_single_quote,
            b'"' if !in_single_quote => in_double_quote = !in_double_quote,
            b'#' if !in_single_quote && !in_double_quote && prev_ws => return Some(i),
            _ => {}
        }
        prev_ws = b.is_ascii_whitespace();
    }
    None
}

fn parse_line(line: &Line<'_>, _entries: usize) -> Result<Fragment, LensError> {
    if let Some(comment) = comment_line(line) {
        return Ok(comment);
    }
    let text = line.text;
    let start = text.len() - text.trim_start().len();
    let mut rest_at = start;
    let exported = match text[start..].strip_prefix("export") {
        Some(after) if after.starts_with(char::is_whitespace) => {
            rest_at = text.len() - after.trim_start().len();
            true
        }
        _ => false,
    };

    let Some(eq) = text[rest_at..].find('=') else {
        return Err(line.error_at(text.len(), "expected '='"));
    };
    let eq = rest_at + eq;
    let key = &text[rest_at..eq];
    if !is_key(key) {
        return Err(line.error_at(rest_at, format!("invalid variable name '{key}'")));
    }

    let value_part = &text[eq + 1..];
    let (raw_value, comment_at) = match trailing_comment(value_part) {
        Some(hash) => (&value_part[..hash], Some(eq + 1 + hash)),
        None => (value_part, None),
    };
    let value = raw_value.trim_end();
    if value.starts_with(char::is_whitespace) {
        return Err(line.error_at(eq + 1, "unexpected whitespace after '='"));
    }

    let mut node = Fragment::new(key).with_value(value).with_span(Span {
        filename: String::new(),
        label: line.range(rest_at, eq),
        value: line.range(eq + 1, eq + 1 + value.len()),
        node: line.range(start, text.len()),
    });
    if exported {
        node = node.with_child(Fragment::new(EXPORT).with_span(Span {
            filename: String::new(),
            label: line.range(start, start + EXPORT.len()),
            value: line.range(start + EXPORT.len(), start + EXPORT.len()),
            node: line.range(start, start + EXPORT.len()),
        }));
    }
    if let Some(hash) = comment_at {
        let raw = &text[hash + 1..];
        let comment = raw.trim();
        let at = hash + 1 + (raw.len() - raw.trim_start().len());
        node = node.with_child(Fragment::new(COMMENT).with_value(comment).with_span(Span {
            filename: String::new(),
            label: line.range(hash, hash),
            value: line.range(at, at + comment.len()),
            node: line.range(hash, text.len()),
        }));
    }
    Ok(node)
}

pub(crate) fn parse(text: &str) -> Result<Parsed, LensError> {
    parse_records(text, parse_line)
}

pub(crate) fn render(fragment: &Fragment) -> Result<String, LensError> {
    if fragment.label == COMMENT {
        return Ok(format!("# {}", fragment.value.as_deref().unwrap_or_default()));
    }
    if !is_key(&fragment.label) {
        return Err(LensError::Put {
            message: format!("invalid variable name '{}'", fragment.label),
        });
    }
    let value = fragment.value.as_deref().unwrap_or_default();
    if value.contains('\n') {
        return Err(LensError::Put {
            message: format!("value of {} spans several lines", fragment.label),
        });
    }
    let mut line = String::new();
    if fragment.child(EXPORT).is_some() {
        line.push_str("export ");
    }
    line.push_str(&fragment.label);
    line.push('=');
    line.push_str(value);
    if let Some(comment) = fragment.child_value(COMMENT) {
        line.push_str(" # ");
        line.push_str(comment);
    }
    Ok(line)
}
