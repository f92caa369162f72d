//! Path expression evaluation against a tree

use std::collections::{HashMap, HashSet};

use generational_arena::Index;

use crate::domain::path::{Axis, NameTest, PathExpr, Predicate, Step};
use crate::domain::tree::Tree;

/// Evaluate `expr` against `tree`; relative expressions start at `ctx`.
///
/// Returns matching nodes in first-seen document order, without duplicates.
/// An empty result is not an error.
pub fn evaluate(tree: &Tree, expr: &PathExpr, ctx: Index) -> Vec<Index> {
    let start = if expr.absolute { tree.root() } else { ctx };
    let mut current = vec![start];
    for step in &expr.steps {
        current = eval_step(tree, step, &current);
        if current.is_empty() {
            break;
        }
    }
    current
}

/// Apply a single step to a set of context nodes.
pub fn eval_step(tree: &Tree, step: &Step, nodes: &[Index]) -> Vec<Index> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &node in nodes {
        for group in candidate_groups(tree, step, node) {
            for idx in apply_predicates(tree, &step.predicates, group) {
                if seen.insert(idx) {
                    out.push(idx);
                }
            }
        }
    }
    out
}

/// Candidates of one step from one context node, grouped by parent so that
/// positional predicates count siblings.
fn candidate_groups(tree: &Tree, step: &Step, node: Index) -> Vec<Vec<Index>> {
    match step.axis {
        Axis::Child => vec![matching_children(tree, node, &step.test)],
        Axis::SelfNode => vec![vec![node]],
        Axis::Parent => tree.parent(node).map(|p| vec![vec![p]]).unwrap_or_default(),
        Axis::Descendant => {
            let mut groups: Vec<Vec<Index>> = Vec::new();
            let mut slot: HashMap<Index, usize> = HashMap::new();
            for (idx, n) in tree.iter(node).skip(1) {
                if !step.test.matches(&n.label) {
                    continue;
                }
                let Some(parent) = n.parent else { continue };
                let i = *slot.entry(parent).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[i].push(idx);
            }
            groups
        }
    }
}

fn matching_children(tree: &Tree, node: Index, test: &NameTest) -> Vec<Index> {
    tree.children(node)
        .iter()
        .copied()
        .filter(|&c| test.matches(tree.label(c)))
        .collect()
}

fn apply_predicates(tree: &Tree, predicates: &[Predicate], mut group: Vec<Index>) -> Vec<Index> {
    for predicate in predicates {
        group = match predicate {
            Predicate::Position(n) => group.get(n - 1).copied().into_iter().collect(),
            Predicate::Last(offset) => {
                let len = group.len() as i64;
                match len.checked_add(*offset) {
                    Some(pos) if pos >= 1 && pos <= len => vec![group[(pos - 1) as usize]],
                    _ => Vec::new(),
                }
            }
            Predicate::ValueEq { rel, value } => group
                .into_iter()
                .filter(|&idx| {
                    relative_nodes(tree, idx, rel)
                        .into_iter()
                        .any(|n| tree.value(n) == Some(value.as_str()))
                })
                .collect(),
            Predicate::Exists(rel) => group
                .into_iter()
                .filter(|&idx| !relative_nodes(tree, idx, rel).is_empty())
                .collect(),
        };
        if group.is_empty() {
            break;
        }
    }
    group
}

fn relative_nodes(tree: &Tree, start: Index, rel: &[NameTest]) -> Vec<Index> {
    let mut nodes = vec![start];
    for test in rel {
        nodes = nodes
            .into_iter()
            .flat_map(|n| matching_children(tree, n, test))
            .collect();
    }
    nodes
}
