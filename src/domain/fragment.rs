//! Owned tree fragments exchanged with the lens engine

/// Byte ranges a node was parsed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanRange {
    pub start: usize,
    pub end: usize,
}

impl SpanRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Source location of a node, as reported by the lens engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Span {
    /// File the node was loaded from; empty until grafted into a session tree.
    pub filename: String,
    pub label: SpanRange,
    pub value: SpanRange,
    pub node: SpanRange,
}

/// A detached subtree: what a lens produces from text and consumes to
/// produce text again.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    pub label: String,
    pub value: Option<String>,
    pub children: Vec<Fragment>,
    pub span: Option<Span>,
}

impl Fragment {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_child(mut self, child: Fragment) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// First child with the given label.
    pub fn child(&self, label: &str) -> Option<&Fragment> {
        self.children.iter().find(|c| c.label == label)
    }

    pub fn child_value(&self, label: &str) -> Option<&str> {
        self.child(label).and_then(|c| c.value.as_deref())
    }

    /// Structural equality ignoring spans.
    pub fn same_content(&self, other: &Fragment) -> bool {
        self.label == other.label
            && self.value == other.value
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.same_content(b))
    }

    /// Drop span information recursively.
    pub fn strip_spans(&mut self) {
        self.span = None;
        for child in &mut self.children {
            child.strip_spans();
        }
    }
}
