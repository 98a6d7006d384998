//! Path enumeration (§4.3)
//!
//! Flattens a [`MatchTree`] into one [`MatchPath`] per root-to-leaf walk. Each path is an
//! independent conjunction: the set of patients matching the original clause is the union
//! of the patients matching each of its paths (§8 property 1).

use crate::criteria::LeafCriterion;
use crate::tree::{MatchTree, NodeId};

/// One root-to-leaf walk, as the ordered list of `criteria_list`s collected along it
/// (root-first).
#[derive(Debug, Clone, Default)]
pub struct MatchPath(pub Vec<Vec<LeafCriterion>>);

impl MatchPath {
    #[must_use]
    pub fn nodes(&self) -> &[Vec<LeafCriterion>] {
        &self.0
    }
}

/// Enumerate every root-to-leaf path of `tree`. A root-only tree (no `or` nodes) yields
/// exactly one path: `[root.criteria_list]`.
#[must_use]
pub fn enumerate_paths(tree: &MatchTree) -> Vec<MatchPath> {
    let mut paths = Vec::new();
    let mut stack: Vec<NodeId> = vec![tree.root()];
    walk(tree, tree.root(), &mut stack, &mut paths);
    paths
}

fn walk(tree: &MatchTree, node_id: NodeId, ancestors: &mut Vec<NodeId>, out: &mut Vec<MatchPath>) {
    let node = tree.node(node_id);
    if node.children.is_empty() {
        let criteria_lists = ancestors
            .iter()
            .map(|&id| tree.node(id).criteria_list.clone())
            .collect();
        out.push(MatchPath(criteria_lists));
        return;
    }
    for &child in &node.children {
        ancestors.push(child);
        walk(tree, child, ancestors, out);
        ancestors.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build_tree;
    use serde_json::json;

    #[test]
    fn tree_with_no_or_yields_one_path() {
        let clause = vec![json!({"clinical": {"AGE_NUMERICAL": ">=18"}})];
        let paths = enumerate_paths(&build_tree(&clause));
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes().len(), 1);
    }

    #[test]
    fn disjunction_yields_one_path_per_alternative() {
        let clause = vec![json!({"or": [
            {"genomic": {"HUGO_SYMBOL": "BRAF"}},
            {"genomic": {"HUGO_SYMBOL": "KRAS"}}
        ])}];
        let paths = enumerate_paths(&build_tree(&clause));
        assert_eq!(paths.len(), 2);
        // each path is root.criteria_list (empty) + or-node.criteria_list (empty) + leaf
        for path in &paths {
            assert_eq!(path.nodes().len(), 3);
        }
    }

    #[test]
    fn empty_clause_yields_single_empty_path() {
        let paths = enumerate_paths(&build_tree(&[]));
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes(), &[Vec::new()]);
    }
}
