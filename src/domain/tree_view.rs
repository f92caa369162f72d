/*
Rendering of subtrees as box-drawing text.

`termtree::Tree` is a foreign type, so conversion goes through a local trait
instead of an inherent impl.
 */
use generational_arena::Index;
use termtree::Tree as TermTree;
use tracing::instrument;

use crate::domain::path::escape_label;
use crate::domain::tree::Tree;

pub trait TreeNodeConvert {
    fn to_tree_string(&self, start: Index) -> TermTree<String>;
}

fn node_text(tree: &Tree, idx: Index) -> String {
    let label = if tree.parent(idx).is_none() {
        "/".to_string()
    } else {
        escape_label(tree.label(idx))
    };
    match tree.value(idx) {
        Some(v) => format!("{label} = \"{v}\""),
        None => label,
    }
}

impl TreeNodeConvert for Tree {
    #[instrument(level = "trace", skip(self))]
    fn to_tree_string(&self, start: Index) -> TermTree<String> {
        fn build_tree(tree: &Tree, node_idx: Index, parent_tree: &mut TermTree<String>) {
            for &child_idx in tree.children(node_idx) {
                let mut child_tree = TermTree::new(node_text(tree, child_idx));
                build_tree(tree, child_idx, &mut child_tree);
                parent_tree.push(child_tree);
            }
        }

        if !self.contains(start) {
            return TermTree::new("Empty tree".to_string());
        }
        let mut rendered = TermTree::new(node_text(self, start));
        build_tree(self, start, &mut rendered);
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_subtree_when_rendered_then_shows_labels_and_values() {
        let mut tree = Tree::new();
        let root = tree.root();
        let entry = tree.ensure_labels(root, &["files", "etc", "hosts", "1"]);
        tree.append_child(entry, "ipaddr", Some("127.0.0.1".into()));
        tree.append_child(entry, "canonical", Some("localhost".into()));

        let text = tree.to_tree_string(entry).to_string();
        assert!(text.starts_with("1\n"));
        assert!(text.contains("ipaddr = \"127.0.0.1\""));
        assert!(text.contains("└── canonical = \"localhost\""));
    }
}
