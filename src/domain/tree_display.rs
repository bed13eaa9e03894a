//! Terminal rendering of a forest.

use generational_arena::Index;
use termtree::Tree;

use crate::domain::arena::TreeIndex;

pub trait TreeNodeConvert {
    /// One `termtree` tree per root.
    fn to_tree_strings(&self) -> Vec<Tree<String>>;
}

impl TreeNodeConvert for TreeIndex {
    fn to_tree_strings(&self) -> Vec<Tree<String>> {
        fn build_tree(index: &TreeIndex, node_idx: Index, parent_tree: &mut Tree<String>) {
            if let Some(node) = index.node(node_idx) {
                for &child_idx in &node.children {
                    if let Some(child) = index.node(child_idx) {
                        let mut child_tree = Tree::new(child.point.to_string());
                        build_tree(index, child_idx, &mut child_tree);
                        parent_tree.push(child_tree);
                    }
                }
            }
        }

        self.roots()
            .iter()
            .filter_map(|&root_idx| {
                let root = self.node(root_idx)?;
                let mut tree = Tree::new(root.point.to_string());
                build_tree(self, root_idx, &mut tree);
                Some(tree)
            })
            .collect()
    }
}
