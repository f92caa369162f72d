//! Transforms: a lens bound to include/exclude glob patterns

use regex::Regex;

use crate::domain::error::{DomainError, DomainResult};

/// Name of a transform when none is given: `@Hosts` and `Hosts.lns` both
/// become `Hosts`.
pub fn derive_name(lens: &str) -> String {
    let trimmed = lens.trim_start_matches('@');
    trimmed.split('.').next().unwrap_or(trimmed).to_string()
}

/// Shell-style file glob.
///
/// `*` and `?` do not cross `/`, `**` does, `[...]` is a character class
/// (`[!...]` negated). Patterns starting with `/` match the whole path below
/// the root; other patterns match the file name only.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> DomainResult<Self> {
        let regex = Regex::new(&glob_to_regex(pattern)).map_err(|e| {
            DomainError::BadArgument(format!("invalid glob pattern {pattern}: {e}"))
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_anchored(&self) -> bool {
        self.pattern.starts_with('/')
    }

    /// `path` is relative to the root but starts with `/`, e.g. `/etc/hosts`.
    pub fn matches(&self, path: &str) -> bool {
        if self.is_anchored() {
            self.regex.is_match(path)
        } else {
            let base = path.rsplit('/').next().unwrap_or(path);
            self.regex.is_match(base)
        }
    }

    /// Leading directory without wildcards, where a listing can start.
    pub fn literal_prefix(&self) -> &str {
        if !self.is_anchored() {
            return "/";
        }
        let wild = self
            .pattern
            .find(['*', '?', '['])
            .unwrap_or(self.pattern.len());
        match self.pattern[..wild].rfind('/') {
            Some(0) | None => "/",
            Some(slash) => &self.pattern[..slash],
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 1;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(rel) => {
                    let body: String = chars[i + 1..i + 1 + rel].iter().collect();
                    let body = match body.strip_prefix('!') {
                        Some(rest) => format!("^{}", rest.replace('\\', "\\\\")),
                        None => body.replace('\\', "\\\\"),
                    };
                    out.push('[');
                    out.push_str(&body);
                    out.push(']');
                    i += rel + 1;
                }
                None => out.push_str("\\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

/// A lens applied to the files selected by `include` minus `exclude`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transform {
    pub name: String,
    pub lens: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Transform {
    pub fn new(name: impl Into<String>, lens: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lens: lens.into(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn include_globs(&self) -> DomainResult<Vec<Glob>> {
        self.include.iter().map(|p| Glob::new(p)).collect()
    }

    pub fn exclude_globs(&self) -> DomainResult<Vec<Glob>> {
        self.exclude.iter().map(|p| Glob::new(p)).collect()
    }

    /// True if some include pattern matches `path` and no exclude pattern does.
    pub fn accepts(&self, path: &str) -> bool {
        let any = |patterns: &[String]| {
            patterns
                .iter()
                .filter_map(|p| Glob::new(p).ok())
                .any(|g| g.matches(path))
        };
        any(&self.include) && !any(&self.exclude)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Hosts.lns", "Hosts")]
    #[case("@Hosts", "Hosts")]
    #[case("Shellvars", "Shellvars")]
    #[case("@Foo.bar.lns", "Foo")]
    fn given_lens_reference_when_deriving_name_then_strips_decoration(
        #[case] lens: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(derive_name(lens), expected);
    }

    #[rstest]
    #[case("/etc/hosts", "/etc/hosts", true)]
    #[case("/etc/*", "/etc/hosts", true)]
    #[case("/etc/*", "/etc/default/grub", false)]
    #[case("/etc/**", "/etc/default/grub", true)]
    #[case("/etc/host?", "/etc/hosts", true)]
    #[case("/etc/[hg]osts", "/etc/hosts", true)]
    #[case("/etc/[!h]osts", "/etc/hosts", false)]
    #[case("*.conf", "/etc/app/x.conf", true)]
    #[case("*.conf", "/etc/app/x.conf.bak", false)]
    #[case("/etc/a.b", "/etc/aXb", false)]
    fn given_glob_when_matching_then_expected(
        #[case] pattern: &str,
        #[case] path: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(Glob::new(pattern).unwrap().matches(path), expected);
    }

    #[test]
    fn given_globs_when_computing_prefix_then_stops_at_first_wildcard() {
        assert_eq!(Glob::new("/etc/default/*").unwrap().literal_prefix(), "/etc/default");
        assert_eq!(Glob::new("/etc/hosts").unwrap().literal_prefix(), "/etc");
        assert_eq!(Glob::new("/*.conf").unwrap().literal_prefix(), "/");
        assert_eq!(Glob::new("*.conf").unwrap().literal_prefix(), "/");
    }

    #[test]
    fn given_exclude_when_accepting_then_exclude_wins() {
        let mut t = Transform::new("Shellvars", "Shellvars.lns");
        t.include.push("/etc/default/*".into());
        t.exclude.push("*.bak".into());
        assert!(t.accepts("/etc/default/grub"));
        assert!(!t.accepts("/etc/default/grub.bak"));
        assert!(!t.accepts("/etc/hosts"));
    }
}
