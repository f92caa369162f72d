//! Path expressions: parsing into an AST
//!
//! Grammar (whitespace allowed inside predicates only):
//!
//! ```text
//! expr      := '/' | ['/'] step (('/' | '//') step)* | '//' step ...
//! step      := ('.' | '..' | '*' | label) predicate*
//! predicate := '[' ( integer
//!                  | 'last()' [('+' | '-') integer]
//!                  | rel ['=' string] ) ']'
//! rel       := '.' | (label | '*') ('/' (label | '*'))*
//! string    := '"' .. '"' | '\'' .. '\''
//! ```

use std::fmt;

use itertools::Itertools;

use crate::domain::error::{DomainError, DomainResult};

/// How a step reaches its candidates from the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    /// Every descendant (not the context node itself).
    Descendant,
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Any,
    Label(String),
}

impl NameTest {
    pub fn matches(&self, label: &str) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Label(l) => l == label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `[N]`, 1-based.
    Position(usize),
    /// `[last()]` is `Last(0)`, `[last()+1]` is `Last(1)`.
    Last(i64),
    /// `[rel = "v"]`; an empty `rel` is the node itself (`.`).
    ValueEq { rel: Vec<NameTest>, value: String },
    /// `[rel]`: at least one node reachable through `rel`.
    Exists(Vec<NameTest>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub axis: Axis,
    pub test: NameTest,
    pub predicates: Vec<Predicate>,
}

impl Step {
    /// Steps `set` may create when nothing matches yet.
    pub fn is_creatable(&self) -> bool {
        self.axis == Axis::Child
            && matches!(self.test, NameTest::Label(_))
            && self
                .predicates
                .iter()
                .all(|p| matches!(p, Predicate::Position(_) | Predicate::Last(_)))
    }

    pub fn label(&self) -> Option<&str> {
        match &self.test {
            NameTest::Label(l) => Some(l),
            NameTest::Any => None,
        }
    }
}

/// A parsed, immutable path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub absolute: bool,
    pub steps: Vec<Step>,
    source: String,
}

impl PathExpr {
    pub fn parse(input: &str) -> DomainResult<Self> {
        Parser::new(input).parse_expr()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Characters that terminate a bare label.
fn is_label_char(c: char) -> bool {
    !matches!(c, '/' | '[' | ']' | '=' | '\\') && !c.is_whitespace()
}

/// Escape a label so it parses back as a single step.
pub fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if !is_label_char(c) || c == '(' {
            out.push('\\');
        }
        out.push(c);
    }
    if label == "*" || label == "." || label == ".." {
        out.insert(0, '\\');
    }
    out
}

/// Join labels into an absolute path, escaping as needed.
pub fn join_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> String {
    format!("/{}", labels.into_iter().map(escape_label).join("/"))
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, reason: &str) -> DomainError {
        DomainError::InvalidPath {
            reason: reason.to_string(),
            details: format!("{}|=|{}", &self.input[..self.pos], &self.input[self.pos..]),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn parse_expr(mut self) -> DomainResult<PathExpr> {
        if self.input.trim().is_empty() {
            return Err(self.error("empty path expression"));
        }
        let mut steps = Vec::new();
        let absolute = self.peek() == Some('/');

        if absolute && self.input == "/" {
            self.pos = 1;
        } else {
            let mut axis = if self.eat("//") {
                Axis::Descendant
            } else {
                self.eat("/");
                Axis::Child
            };
            loop {
                steps.push(self.parse_step(axis)?);
                if self.eat("//") {
                    axis = Axis::Descendant;
                } else if self.eat("/") {
                    axis = Axis::Child;
                } else {
                    break;
                }
            }
        }

        if self.pos != self.input.len() {
            return Err(self.error("unexpected characters after path"));
        }
        Ok(PathExpr {
            absolute,
            steps,
            source: self.input.to_string(),
        })
    }

    fn parse_step(&mut self, axis: Axis) -> DomainResult<Step> {
        let (axis, test) = if self.eat("..") {
            (Axis::Parent, NameTest::Any)
        } else if self.peek() == Some('.') && !self.rest()[1..].starts_with(|c| is_label_char(c) || c == '\\') {
            self.bump();
            (Axis::SelfNode, NameTest::Any)
        } else if self.peek() == Some('*') && !self.rest()[1..].starts_with(|c| is_label_char(c) || c == '\\') {
            self.bump();
            (axis, NameTest::Any)
        } else {
            (axis, NameTest::Label(self.parse_label()?))
        };
        if self.peek() == Some('(') {
            return Err(self.error("unknown function"));
        }

        let mut predicates = Vec::new();
        while self.eat("[") {
            self.skip_ws();
            predicates.push(self.parse_predicate()?);
            self.skip_ws();
            if !self.eat("]") {
                return Err(self.error("expected ']'"));
            }
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_label(&mut self) -> DomainResult<String> {
        let mut label = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                match self.bump() {
                    Some(escaped) => label.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_label_char(c) && c != '(' {
                label.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if label.is_empty() {
            return Err(self.error("expected a label"));
        }
        Ok(label)
    }

    fn parse_number(&mut self) -> DomainResult<i64> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| self.error("expected a number"))
    }

    fn parse_predicate(&mut self) -> DomainResult<Predicate> {
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let n = self.parse_number()?;
            if n < 1 {
                return Err(self.error("positions start at 1"));
            }
            return Ok(Predicate::Position(n as usize));
        }
        if self.eat("last()") {
            self.skip_ws();
            let offset = if self.eat("+") {
                self.skip_ws();
                self.parse_number()?
            } else if self.eat("-") {
                self.skip_ws();
                -self.parse_number()?
            } else {
                0
            };
            return Ok(Predicate::Last(offset));
        }

        let rel = self.parse_relative()?;
        self.skip_ws();
        if self.eat("=") {
            self.skip_ws();
            let value = self.parse_string()?;
            Ok(Predicate::ValueEq { rel, value })
        } else if rel.is_empty() {
            Err(self.error("expected '=' after '.'"))
        } else {
            Ok(Predicate::Exists(rel))
        }
    }

    fn parse_relative(&mut self) -> DomainResult<Vec<NameTest>> {
        if self.peek() == Some('.') && !self.rest()[1..].starts_with(is_label_char) {
            self.bump();
            return Ok(Vec::new());
        }
        let mut rel = Vec::new();
        loop {
            if self.peek() == Some('*') && !self.rest()[1..].starts_with(is_label_char) {
                self.bump();
                rel.push(NameTest::Any);
            } else {
                let label = self.parse_label()?;
                if self.peek() == Some('(') {
                    return Err(self.error("unknown function"));
                }
                rel.push(NameTest::Label(label));
            }
            if !self.eat("/") {
                break;
            }
        }
        Ok(rel)
    }

    fn parse_string(&mut self) -> DomainResult<String> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted string")),
        };
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(c) => value.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) if c == quote => return Ok(value),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> NameTest {
        NameTest::Label(s.to_string())
    }

    #[test]
    fn given_absolute_path_when_parsing_then_yields_child_steps() {
        let expr = PathExpr::parse("/files/etc/hosts").unwrap();
        assert!(expr.absolute);
        assert_eq!(expr.steps.len(), 3);
        assert!(expr.steps.iter().all(|s| s.axis == Axis::Child));
        assert_eq!(expr.steps[2].test, label("hosts"));
    }

    #[test]
    fn given_root_when_parsing_then_no_steps() {
        let expr = PathExpr::parse("/").unwrap();
        assert!(expr.absolute);
        assert!(expr.steps.is_empty());
    }

    #[test]
    fn given_predicates_when_parsing_then_all_kinds_recognized() {
        let expr = PathExpr::parse("a/b[2]/c[last()]/d[last()+1]/e[last() - 1]").unwrap();
        assert!(!expr.absolute);
        assert_eq!(expr.steps[1].predicates, vec![Predicate::Position(2)]);
        assert_eq!(expr.steps[2].predicates, vec![Predicate::Last(0)]);
        assert_eq!(expr.steps[3].predicates, vec![Predicate::Last(1)]);
        assert_eq!(expr.steps[4].predicates, vec![Predicate::Last(-1)]);
    }

    #[test]
    fn given_value_predicate_when_parsing_then_captures_rel_and_value() {
        let expr = PathExpr::parse("/files/etc/hosts/*[ipaddr = '127.0.0.1']").unwrap();
        assert_eq!(expr.steps[3].test, NameTest::Any);
        assert_eq!(
            expr.steps[3].predicates,
            vec![Predicate::ValueEq {
                rel: vec![label("ipaddr")],
                value: "127.0.0.1".into()
            }]
        );

        let expr = PathExpr::parse("/a/b[. = \"x\"][alias]").unwrap();
        assert_eq!(
            expr.steps[1].predicates,
            vec![
                Predicate::ValueEq {
                    rel: vec![],
                    value: "x".into()
                },
                Predicate::Exists(vec![label("alias")]),
            ]
        );
    }

    #[test]
    fn given_descendant_and_dots_when_parsing_then_axes_set() {
        let expr = PathExpr::parse("/augeas//error/../.").unwrap();
        let axes: Vec<Axis> = expr.steps.iter().map(|s| s.axis).collect();
        assert_eq!(
            axes,
            vec![Axis::Child, Axis::Descendant, Axis::Parent, Axis::SelfNode]
        );
    }

    #[test]
    fn given_escaped_label_when_parsing_then_unescaped() {
        let expr = PathExpr::parse("/files/my\\ file/#comment").unwrap();
        assert_eq!(expr.steps[1].test, label("my file"));
        assert_eq!(expr.steps[2].test, label("#comment"));
    }

    #[test]
    fn given_malformed_paths_when_parsing_then_invalid_path() {
        for bad in ["", "/a[1", "/a[last(]", "/a[foo()]", "/a/count(b)", "/a//", "/a[0]", "/a]", "/a[b = \"x]"] {
            let err = PathExpr::parse(bad).unwrap_err();
            assert!(
                matches!(err, DomainError::InvalidPath { .. }),
                "expected InvalidPath for {bad:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn given_error_when_parsing_then_details_mark_position() {
        let err = PathExpr::parse("/files/a[x").unwrap_err();
        match err {
            DomainError::InvalidPath { details, .. } => assert_eq!(details, "/files/a[x|=|"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn given_special_labels_when_escaping_then_parse_back() {
        for raw in ["my file", "a[1]", "*", "x=y", "f(x)"] {
            let path = join_labels([raw]);
            let expr = PathExpr::parse(&path).unwrap();
            assert_eq!(expr.steps[0].test, label(raw), "round trip of {raw:?}");
        }
    }
}
