//! Legacy command channel
//!
//! `srun` scripts are newline-separated commands. Arguments are separated by
//! whitespace and may be quoted with `'` or `"`; a backslash escapes the next
//! character.

use std::fmt::Write as _;

use tracing::{debug, instrument};

use crate::application::session::Session;
use crate::application::ApplicationError;
use crate::error::AugResult;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Get { path: String },
    Set { path: String, value: Option<String> },
    Setm { base: String, sub: String, value: Option<String> },
    Clear { path: String },
    Rm { path: String },
    Match { path: String, value: Option<String> },
    Ins { label: String, before: bool, path: String },
    Mv { src: String, dst: String },
    Cp { src: String, dst: String },
    Rename { path: String, label: String },
    Label { path: String },
    Print { path: String },
    Load,
    Save,
    Transform { lens: String, exclude: bool, file: String },
    Quit,
}

/// Split a command line into words.
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                let next = chars.next().ok_or("trailing backslash")?;
                current.push(next);
                in_word = true;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(format!("unterminated quote {q}"));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn arity(name: &str, args: &[String], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min}-{max}")
        };
        return Err(format!(
            "command {name} takes {expected} arguments, got {}",
            args.len()
        ));
    }
    Ok(())
}

fn parse_command(words: Vec<String>) -> Result<Command, String> {
    let mut words = words.into_iter();
    let name = words.next().unwrap_or_default();
    let args: Vec<String> = words.collect();
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
    let opt = |i: usize| args.get(i).cloned();

    let command = match name.as_str() {
        "get" => {
            arity(&name, &args, 1, 1)?;
            Command::Get { path: arg(0) }
        }
        "set" => {
            arity(&name, &args, 1, 2)?;
            Command::Set { path: arg(0), value: opt(1) }
        }
        "setm" => {
            arity(&name, &args, 2, 3)?;
            Command::Setm { base: arg(0), sub: arg(1), value: opt(2) }
        }
        "clear" => {
            arity(&name, &args, 1, 1)?;
            Command::Clear { path: arg(0) }
        }
        "rm" => {
            arity(&name, &args, 1, 1)?;
            Command::Rm { path: arg(0) }
        }
        "match" => {
            arity(&name, &args, 1, 2)?;
            Command::Match { path: arg(0), value: opt(1) }
        }
        "ins" | "insert" => {
            arity(&name, &args, 3, 3)?;
            let before = match arg(1).as_str() {
                "before" => true,
                "after" => false,
                other => return Err(format!("expected 'before' or 'after', got '{other}'")),
            };
            Command::Ins { label: arg(0), before, path: arg(2) }
        }
        "mv" | "move" => {
            arity(&name, &args, 2, 2)?;
            Command::Mv { src: arg(0), dst: arg(1) }
        }
        "cp" | "copy" => {
            arity(&name, &args, 2, 2)?;
            Command::Cp { src: arg(0), dst: arg(1) }
        }
        "rename" => {
            arity(&name, &args, 2, 2)?;
            Command::Rename { path: arg(0), label: arg(1) }
        }
        "label" => {
            arity(&name, &args, 1, 1)?;
            Command::Label { path: arg(0) }
        }
        "print" | "dump" => {
            arity(&name, &args, 0, 1)?;
            Command::Print { path: opt(0).unwrap_or_else(|| "/*".to_string()) }
        }
        "load" => {
            arity(&name, &args, 0, 0)?;
            Command::Load
        }
        "save" => {
            arity(&name, &args, 0, 0)?;
            Command::Save
        }
        "transform" => {
            arity(&name, &args, 3, 3)?;
            let exclude = match arg(1).as_str() {
                "incl" => false,
                "excl" => true,
                other => return Err(format!("expected 'incl' or 'excl', got '{other}'")),
            };
            Command::Transform { lens: arg(0), exclude, file: arg(2) }
        }
        "quit" | "exit" => {
            arity(&name, &args, 0, 0)?;
            Command::Quit
        }
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(command)
}

fn execute_command(session: &mut Session, command: &Command, out: &mut String) -> AugResult<()> {
    match command {
        Command::Get { path } => {
            let line = match session.get(path)? {
                Some(value) => format!("{path} = {value}"),
                None => format!("{path} (none)"),
            };
            writeln!(out, "{line}").ok();
        }
        Command::Set { path, value } => session.set(path, value.as_deref())?,
        Command::Setm { base, sub, value } => {
            session.setm(base, Some(sub.as_str()), value.as_deref())?;
        }
        Command::Clear { path } => session.clear(path)?,
        Command::Rm { path } => {
            let removed = session.rm(path)?;
            writeln!(out, "rm : {path} {removed}").ok();
        }
        Command::Match { path, value } => {
            let mut found = session.matches(path)?;
            if let Some(value) = value {
                let mut kept = Vec::new();
                for p in found {
                    if session.get(&p)?.as_deref() == Some(value.as_str()) {
                        kept.push(p);
                    }
                }
                found = kept;
            }
            if found.is_empty() {
                writeln!(out, "  (no matches)").ok();
            }
            for p in found {
                writeln!(out, "{p}").ok();
            }
        }
        Command::Ins { label, before, path } => session.insert(path, label, *before)?,
        Command::Mv { src, dst } => session.mv(src, dst)?,
        Command::Cp { src, dst } => session.cp(src, dst)?,
        Command::Rename { path, label } => {
            session.rename(path, label)?;
        }
        Command::Label { path } => {
            let label = session.label(path)?;
            writeln!(out, "{path} {}", label.as_deref().unwrap_or("(none)")).ok();
        }
        Command::Print { path } => out.push_str(&session.print(path)?),
        Command::Load => session.load()?,
        Command::Save => {
            session.save()?;
            writeln!(out, "Saved").ok();
        }
        Command::Transform { lens, exclude, file } => session.transform(lens, file, *exclude)?,
        Command::Quit => {}
    }
    Ok(())
}

/// Run `script` against `session`. Returns the number of commands executed
/// (negative on failure) and their output.
#[instrument(level = "debug", skip(session))]
pub(crate) fn run(session: &mut Session, script: &str) -> (i32, String) {
    let mut out = String::new();
    let mut count = 0;

    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command = match tokenize(line).and_then(parse_command) {
            Ok(command) => command,
            Err(reason) => {
                debug!("rejected command {:?}: {}", line, reason);
                session.record_failure(&ApplicationError::CommandFailed { context: reason });
                return (-1, out);
            }
        };
        if let Err(e) = execute_command(session, &command, &mut out) {
            debug!("command {:?} failed: {}", line, e);
            return (-1, out);
        }
        count += 1;
        if command == Command::Quit {
            break;
        }
    }
    (count, out)
}
