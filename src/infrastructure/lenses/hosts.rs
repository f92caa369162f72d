//! `/etc/hosts` lens
//!
//! ```text
//! /files/etc/hosts/1/ipaddr = "127.0.0.1"
//! /files/etc/hosts/1/canonical = "localhost"
//! /files/etc/hosts/1/alias = "localhost.localdomain"
//! /files/etc/hosts/#comment = "static entries"
//! ```

use crate::domain::{Fragment, Span};
use crate::infrastructure::error::LensError;
use crate::infrastructure::lenses::{comment_line, parse_records, Line, Parsed, COMMENT};

/// Whitespace-separated tokens with their byte offsets.
pub(crate) fn tokens(s: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in s.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(st)) => {
                out.push((st, &s[st..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(st) = start {
        out.push((st, &s[st..]));
    }
    out
}

fn is_ipaddr(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '%'))
}

fn field(line: &Line<'_>, label: &str, at: usize, text: &str) -> Fragment {
    Fragment::new(label).with_value(text).with_span(Span {
        filename: String::new(),
        label: line.range(at, at),
        value: line.range(at, at + text.len()),
        node: line.range(at, at + text.len()),
    })
}

fn parse_line(line: &Line<'_>, entries: usize) -> Result<Fragment, LensError> {
    if let Some(comment) = comment_line(line) {
        return Ok(comment);
    }
    let (body, eol) = match line.text.find('#') {
        Some(hash) => (&line.text[..hash], Some(hash)),
        None => (line.text, None),
    };
    let fields = tokens(body);
    let (ip_at, ip) = fields[0];
    if !is_ipaddr(ip) {
        return Err(line.error_at(ip_at, format!("invalid address '{ip}'")));
    }
    let Some(&(canon_at, canonical)) = fields.get(1) else {
        return Err(line.error_at(ip_at + ip.len(), "expected canonical hostname"));
    };

    let label = (entries + 1).to_string();
    let mut entry = Fragment::new(label)
        .with_child(field(line, "ipaddr", ip_at, ip))
        .with_child(field(line, "canonical", canon_at, canonical));
    for &(at, alias) in &fields[2..] {
        entry = entry.with_child(field(line, "alias", at, alias));
    }
    if let Some(hash) = eol {
        let raw = &line.text[hash + 1..];
        let value = raw.trim();
        let at = hash + 1 + (raw.len() - raw.trim_start().len());
        entry = entry.with_child(field(line, COMMENT, at, value));
    }
    let start = fields[0].0;
    Ok(entry.with_span(Span {
        filename: String::new(),
        label: line.range(start, start),
        value: line.range(start, start),
        node: line.range(start, line.text.len()),
    }))
}

pub(crate) fn parse(text: &str) -> Result<Parsed, LensError> {
    parse_records(text, parse_line)
}

pub(crate) fn render(fragment: &Fragment) -> Result<String, LensError> {
    if fragment.label == COMMENT {
        return Ok(format!("# {}", fragment.value.as_deref().unwrap_or_default()));
    }
    let required = |label: &str| {
        fragment
            .child_value(label)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LensError::Put {
                message: format!("entry {} has no {label}", fragment.label),
            })
    };
    let mut line = format!("{}\t{}", required("ipaddr")?, required("canonical")?);
    for child in &fragment.children {
        match child.label.as_str() {
            "ipaddr" | "canonical" | COMMENT => {}
            "alias" => {
                if let Some(alias) = child.value.as_deref() {
                    line.push(' ');
                    line.push_str(alias);
                }
            }
            other => {
                return Err(LensError::Put {
                    message: format!("unexpected node '{other}' in entry {}", fragment.label),
                })
            }
        }
    }
    if let Some(comment) = fragment.child_value(COMMENT) {
        line.push_str(" # ");
        line.push_str(comment);
    }
    Ok(line)
}
