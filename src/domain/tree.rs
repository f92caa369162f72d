use generational_arena::{Arena, Index};
use tracing::{instrument, trace};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::eval::{eval_step, evaluate};
use crate::domain::fragment::{Fragment, Span};
use crate::domain::path::{escape_label, PathExpr, Predicate, Step};

/// Tree node in the arena-based hierarchy structure.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Label; not unique among siblings. Empty for the root.
    pub label: String,
    pub value: Option<String>,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in document order
    pub children: Vec<Index>,
    /// Modified since the last load or save
    pub dirty: bool,
    /// Protected from path-based mutation (applies to the whole subtree)
    pub read_only: bool,
    pub span: Option<Span>,
}

impl TreeNode {
    fn new(label: impl Into<String>, value: Option<String>, parent: Option<Index>) -> Self {
        Self {
            label: label.into(),
            value,
            parent,
            children: Vec::new(),
            dirty: false,
            read_only: false,
            span: None,
        }
    }
}

/// Arena-backed configuration tree.
///
/// The index-based methods (`append_child`, `ensure_labels`, ...) are the raw
/// layer used for internal projections and never check read-only flags. The
/// path-based methods (`set`, `remove`, `insert`, ...) are what callers reach
/// through a session; they enforce read-only subtrees and track dirtiness.
#[derive(Debug)]
pub struct Tree {
    arena: Arena<TreeNode>,
    root: Index,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Labels must be non-empty and may not contain `/`.
pub fn validate_label(label: &str) -> DomainResult<()> {
    if label.is_empty() || label.contains('/') {
        return Err(DomainError::InvalidLabel(label.to_string()));
    }
    Ok(())
}

impl Tree {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(TreeNode::new("", None, None));
        Self { arena, root }
    }

    pub fn root(&self) -> Index {
        self.root
    }

    pub fn node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn contains(&self, idx: Index) -> bool {
        self.arena.contains(idx)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() <= 1
    }

    pub fn label(&self, idx: Index) -> &str {
        self.arena.get(idx).map(|n| n.label.as_str()).unwrap_or("")
    }

    pub fn value(&self, idx: Index) -> Option<&str> {
        self.arena.get(idx).and_then(|n| n.value.as_deref())
    }

    pub fn parent(&self, idx: Index) -> Option<Index> {
        self.arena.get(idx).and_then(|n| n.parent)
    }

    pub fn children(&self, idx: Index) -> &[Index] {
        self.arena
            .get(idx)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn span(&self, idx: Index) -> Option<&Span> {
        self.arena.get(idx).and_then(|n| n.span.as_ref())
    }

    pub fn iter(&self, start: Index) -> TreeIterator<'_> {
        TreeIterator::new(self, start)
    }

    // ------------------------------------------------------------
    // Raw, index-based layer
    // ------------------------------------------------------------

    pub fn append_child(&mut self, parent: Index, label: &str, value: Option<String>) -> Index {
        let at = self.children(parent).len();
        self.insert_child_at(parent, at, label, value)
    }

    pub fn insert_child_at(
        &mut self,
        parent: Index,
        at: usize,
        label: &str,
        value: Option<String>,
    ) -> Index {
        let idx = self
            .arena
            .insert(TreeNode::new(label, value, Some(parent)));
        if let Some(p) = self.arena.get_mut(parent) {
            let at = at.min(p.children.len());
            p.children.insert(at, idx);
        }
        idx
    }

    /// First child of `parent` labelled `label`.
    pub fn child(&self, parent: Index, label: &str) -> Option<Index> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.label(c) == label)
    }

    pub fn ensure_child(&mut self, parent: Index, label: &str) -> Index {
        match self.child(parent, label) {
            Some(idx) => idx,
            None => self.append_child(parent, label, None),
        }
    }

    pub fn ensure_labels(&mut self, parent: Index, labels: &[&str]) -> Index {
        labels
            .iter()
            .fold(parent, |current, label| self.ensure_child(current, label))
    }

    pub fn set_value_at(&mut self, idx: Index, value: Option<String>) {
        if let Some(node) = self.arena.get_mut(idx) {
            node.value = value;
        }
    }

    pub fn set_read_only(&mut self, idx: Index, read_only: bool) {
        if let Some(node) = self.arena.get_mut(idx) {
            node.read_only = read_only;
        }
    }

    pub fn set_span(&mut self, idx: Index, span: Option<Span>) {
        if let Some(node) = self.arena.get_mut(idx) {
            node.span = span;
        }
    }

    /// Remove all children of `idx` with their subtrees; returns the number
    /// of nodes removed.
    pub fn clear_children(&mut self, idx: Index) -> usize {
        let children: Vec<Index> = self.children(idx).to_vec();
        children.into_iter().map(|c| self.remove_subtree(c)).sum()
    }

    /// Detach `idx` from its parent and drop it with its subtree. The root
    /// cannot be dropped; its children are removed instead.
    pub fn remove_subtree(&mut self, idx: Index) -> usize {
        if idx == self.root {
            return self.clear_children(idx);
        }
        self.detach(idx);
        let doomed: Vec<Index> = self.iter(idx).map(|(i, _)| i).collect();
        for i in &doomed {
            self.arena.remove(*i);
        }
        doomed.len()
    }

    fn detach(&mut self, idx: Index) {
        if let Some(parent) = self.parent(idx) {
            if let Some(p) = self.arena.get_mut(parent) {
                p.children.retain(|&c| c != idx);
            }
        }
    }

    /// True if `ancestor` is `idx` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: Index, idx: Index) -> bool {
        let mut current = Some(idx);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    /// True if `idx` or any of its ancestors is read-only.
    pub fn is_read_only(&self, idx: Index) -> bool {
        let mut current = Some(idx);
        while let Some(c) = current {
            if self.arena.get(c).is_some_and(|n| n.read_only) {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    fn contains_read_only(&self, idx: Index) -> bool {
        self.iter(idx).any(|(_, n)| n.read_only)
    }

    fn ensure_writable(&self, idx: Index) -> DomainResult<()> {
        if self.is_read_only(idx) || self.contains_read_only(idx) {
            return Err(DomainError::ReadOnly(self.path_of(idx)));
        }
        Ok(())
    }

    /// Mark `idx` and all its ancestors as modified.
    pub fn mark_dirty(&mut self, idx: Index) {
        let mut current = Some(idx);
        while let Some(c) = current {
            match self.arena.get_mut(c) {
                Some(node) => {
                    node.dirty = true;
                    current = node.parent;
                }
                None => break,
            }
        }
    }

    pub fn is_dirty(&self, idx: Index) -> bool {
        self.arena.get(idx).is_some_and(|n| n.dirty)
    }

    /// Clear the dirty flag on `idx` and its whole subtree.
    pub fn clear_dirty(&mut self, idx: Index) {
        let nodes: Vec<Index> = self.iter(idx).map(|(i, _)| i).collect();
        for i in nodes {
            if let Some(node) = self.arena.get_mut(i) {
                node.dirty = false;
            }
        }
    }

    /// Canonical path of a node: labels from the root, with `[N]` where
    /// siblings share a label.
    pub fn path_of(&self, idx: Index) -> String {
        let mut segments = Vec::new();
        let mut current = idx;
        while let Some(parent) = self.parent(current) {
            let label = self.label(current);
            let same: Vec<Index> = self
                .children(parent)
                .iter()
                .copied()
                .filter(|&c| self.label(c) == label)
                .collect();
            let mut segment = escape_label(label);
            if same.len() > 1 {
                let pos = same.iter().position(|&c| c == current).unwrap_or(0) + 1;
                segment.push_str(&format!("[{pos}]"));
            }
            segments.push(segment);
            current = parent;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Append copies of `fragments` under `parent`.
    pub fn graft(&mut self, parent: Index, fragments: &[Fragment]) {
        for fragment in fragments {
            let idx = self.append_child(parent, &fragment.label, fragment.value.clone());
            self.set_span(idx, fragment.span.clone());
            self.graft(idx, &fragment.children);
        }
    }

    /// Detached copy of the subtree at `idx`.
    pub fn to_fragment(&self, idx: Index) -> Fragment {
        Fragment {
            label: self.label(idx).to_string(),
            value: self.value(idx).map(str::to_string),
            children: self
                .children(idx)
                .iter()
                .map(|&c| self.to_fragment(c))
                .collect(),
            span: self.span(idx).cloned(),
        }
    }

    /// `path = "value"` lines for the subtree at `idx`, in document order.
    pub fn dump(&self, idx: Index) -> Vec<String> {
        self.iter(idx)
            .map(|(i, n)| match &n.value {
                Some(v) => format!("{} = \"{}\"", self.path_of(i), v),
                None => self.path_of(i),
            })
            .collect()
    }

    // ------------------------------------------------------------
    // Path-based layer
    // ------------------------------------------------------------

    pub fn select(&self, expr: &PathExpr, ctx: Index) -> Vec<Index> {
        evaluate(self, expr, ctx)
    }

    /// The single node matching `expr`.
    pub fn select_one(&self, expr: &PathExpr, ctx: Index) -> DomainResult<Index> {
        let matches = self.select(expr, ctx);
        match matches.as_slice() {
            [idx] => Ok(*idx),
            [] => Err(DomainError::NoMatch(expr.to_string())),
            _ => Err(DomainError::MultipleMatches(expr.to_string())),
        }
    }

    pub fn get(&self, expr: &PathExpr, ctx: Index) -> DomainResult<Option<&str>> {
        let idx = self.select_one(expr, ctx)?;
        Ok(self.value(idx))
    }

    pub fn match_paths(&self, expr: &PathExpr, ctx: Index) -> Vec<String> {
        self.select(expr, ctx)
            .into_iter()
            .map(|idx| self.path_of(idx))
            .collect()
    }

    /// Find the single node for `expr`, creating missing trailing steps.
    #[instrument(level = "trace", skip(self))]
    pub fn expand(&mut self, expr: &PathExpr, ctx: Index) -> DomainResult<Index> {
        let matches = self.select(expr, ctx);
        match matches.len() {
            1 => return Ok(matches[0]),
            0 => {}
            _ => return Err(DomainError::MultipleMatches(expr.to_string())),
        }

        let mut current = if expr.absolute { self.root } else { ctx };
        for (i, step) in expr.steps.iter().enumerate() {
            let found = eval_step(self, step, &[current]);
            match found.len() {
                1 => current = found[0],
                0 => return self.create_steps(current, &expr.steps[i..], expr),
                _ => return Err(DomainError::MultipleMatches(expr.to_string())),
            }
        }
        Ok(current)
    }

    /// The node `expand` would create below (or return) for `expr`: the end
    /// of the longest prefix that matches exactly one node.
    fn deepest_existing(&self, expr: &PathExpr, ctx: Index) -> Index {
        if let [idx] = self.select(expr, ctx).as_slice() {
            return *idx;
        }
        let mut current = if expr.absolute { self.root } else { ctx };
        for step in &expr.steps {
            match eval_step(self, step, &[current]).as_slice() {
                [next] => current = *next,
                _ => break,
            }
        }
        current
    }

    fn create_steps(&mut self, parent: Index, steps: &[Step], expr: &PathExpr) -> DomainResult<Index> {
        if self.is_read_only(parent) {
            return Err(DomainError::ReadOnly(self.path_of(parent)));
        }
        // Validate everything before touching the tree.
        for (i, step) in steps.iter().enumerate() {
            let label = match step.label() {
                Some(label) if step.is_creatable() => label,
                _ => return Err(DomainError::NotCreatable(expr.to_string())),
            };
            validate_label(label)?;
            let siblings = if i == 0 {
                self.children(parent)
                    .iter()
                    .filter(|&&c| self.label(c) == label)
                    .count()
            } else {
                0
            };
            for predicate in &step.predicates {
                let ok = match predicate {
                    Predicate::Position(n) => *n == siblings + 1,
                    Predicate::Last(offset) => *offset >= 0,
                    _ => false,
                };
                if !ok {
                    return Err(DomainError::NotCreatable(expr.to_string()));
                }
            }
        }

        let mut current = parent;
        for step in steps {
            let label = step.label().unwrap_or_default().to_string();
            current = self.append_child(current, &label, None);
            trace!("created {}", self.path_of(current));
        }
        self.mark_dirty(current);
        Ok(current)
    }

    pub fn set(&mut self, expr: &PathExpr, ctx: Index, value: Option<&str>) -> DomainResult<Index> {
        let idx = self.expand(expr, ctx)?;
        if self.is_read_only(idx) {
            return Err(DomainError::ReadOnly(self.path_of(idx)));
        }
        self.set_value_at(idx, value.map(str::to_string));
        self.mark_dirty(idx);
        Ok(idx)
    }

    /// Set `sub` (or the node itself) below every match of `base`.
    pub fn setm(
        &mut self,
        base: &PathExpr,
        sub: Option<&PathExpr>,
        ctx: Index,
        value: Option<&str>,
    ) -> DomainResult<usize> {
        if sub.is_some_and(|s| s.absolute) {
            return Err(DomainError::BadArgument(format!(
                "sub-path must be relative: {}",
                sub.map(|s| s.source()).unwrap_or_default()
            )));
        }
        let bases = self.select(base, ctx);
        let mut targets = Vec::new();
        for b in bases {
            match sub {
                None => targets.push(b),
                Some(sub) => {
                    let found = self.select(sub, b);
                    if found.is_empty() {
                        targets.push(self.expand(sub, b)?);
                    } else {
                        targets.extend(found);
                    }
                }
            }
        }
        for &t in &targets {
            if self.is_read_only(t) {
                return Err(DomainError::ReadOnly(self.path_of(t)));
            }
        }
        for &t in &targets {
            self.set_value_at(t, value.map(str::to_string));
            self.mark_dirty(t);
        }
        Ok(targets.len())
    }

    /// Remove every match with its subtree; returns the number of nodes
    /// removed, descendants included.
    #[instrument(level = "trace", skip(self))]
    pub fn remove(&mut self, expr: &PathExpr, ctx: Index) -> DomainResult<usize> {
        let matches = self.select(expr, ctx);
        let targets: Vec<Index> = matches
            .iter()
            .copied()
            .filter(|&m| {
                !matches
                    .iter()
                    .any(|&other| other != m && self.is_ancestor_or_self(other, m))
            })
            .collect();
        for &t in &targets {
            if t == self.root {
                return Err(DomainError::BadArgument("cannot remove the root node".into()));
            }
            self.ensure_writable(t)?;
        }

        let mut count = 0;
        for t in targets {
            let parent = self.parent(t);
            count += self.remove_subtree(t);
            if let Some(p) = parent {
                self.mark_dirty(p);
            }
        }
        Ok(count)
    }

    /// Insert a new sibling labelled `label` before or after the single
    /// match of `expr`.
    pub fn insert(
        &mut self,
        expr: &PathExpr,
        ctx: Index,
        label: &str,
        before: bool,
    ) -> DomainResult<Index> {
        validate_label(label)?;
        let target = self.select_one(expr, ctx)?;
        let parent = self
            .parent(target)
            .ok_or_else(|| DomainError::BadArgument("cannot insert a sibling of the root node".into()))?;
        if self.is_read_only(parent) {
            return Err(DomainError::ReadOnly(self.path_of(parent)));
        }
        let pos = self
            .children(parent)
            .iter()
            .position(|&c| c == target)
            .unwrap_or(0);
        let at = if before { pos } else { pos + 1 };
        let idx = self.insert_child_at(parent, at, label, None);
        self.mark_dirty(idx);
        Ok(idx)
    }

    /// Move the single match of `src` to `dst`, replacing whatever `dst`
    /// held. `dst` is created when missing; the moved node takes its label.
    pub fn move_node(&mut self, src: &PathExpr, dst: &PathExpr, ctx: Index) -> DomainResult<Index> {
        let from = self.select_one(src, ctx)?;
        if from == self.root {
            return Err(DomainError::BadArgument("cannot move the root node".into()));
        }
        self.ensure_writable(from)?;
        if self.is_ancestor_or_self(from, self.deepest_existing(dst, ctx)) {
            return Err(DomainError::MoveIntoDescendant(dst.to_string()));
        }
        let to = self.expand(dst, ctx)?;
        if self.is_ancestor_or_self(from, to) {
            return Err(DomainError::MoveIntoDescendant(dst.to_string()));
        }
        if self.is_read_only(to) {
            return Err(DomainError::ReadOnly(self.path_of(to)));
        }

        let old_parent = self.parent(from);
        self.detach(from);
        self.clear_children(to);
        let moved = self.arena.remove(from);
        if let Some(moved) = moved {
            for &child in &moved.children {
                if let Some(c) = self.arena.get_mut(child) {
                    c.parent = Some(to);
                }
            }
            if let Some(node) = self.arena.get_mut(to) {
                node.value = moved.value;
                node.span = moved.span;
                node.children = moved.children;
            }
        }
        if let Some(p) = old_parent.filter(|p| self.contains(*p)) {
            self.mark_dirty(p);
        }
        self.mark_dirty(to);
        Ok(to)
    }

    /// Deep-copy the single match of `src` onto `dst`.
    pub fn copy_node(&mut self, src: &PathExpr, dst: &PathExpr, ctx: Index) -> DomainResult<Index> {
        let from = self.select_one(src, ctx)?;
        if self.is_ancestor_or_self(from, self.deepest_existing(dst, ctx)) {
            return Err(DomainError::CopyIntoDescendant(dst.to_string()));
        }
        let to = self.expand(dst, ctx)?;
        if self.is_ancestor_or_self(from, to) {
            return Err(DomainError::CopyIntoDescendant(dst.to_string()));
        }
        self.ensure_writable(to)?;

        let copy = self.to_fragment(from);
        self.clear_children(to);
        self.set_value_at(to, copy.value.clone());
        self.graft(to, &copy.children);
        self.mark_dirty(to);
        Ok(to)
    }

    /// Relabel every match; returns the number of nodes renamed.
    pub fn rename(&mut self, expr: &PathExpr, ctx: Index, label: &str) -> DomainResult<usize> {
        validate_label(label)?;
        let matches = self.select(expr, ctx);
        for &m in &matches {
            if m == self.root {
                return Err(DomainError::BadArgument("cannot rename the root node".into()));
            }
            self.ensure_writable(m)?;
        }
        for &m in &matches {
            if let Some(node) = self.arena.get_mut(m) {
                node.label = label.to_string();
            }
            self.mark_dirty(m);
        }
        Ok(matches.len())
    }
}

/// Pre-order traversal of a subtree, starting with the start node itself.
pub struct TreeIterator<'a> {
    tree: &'a Tree,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(tree: &'a Tree, start: Index) -> Self {
        let stack = if tree.contains(start) { vec![start] } else { Vec::new() };
        Self { tree, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.tree.node(current) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current, node));
            }
        }
        None
    }
}
