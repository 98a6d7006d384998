//! Match tree (arena)
//!
//! Converts one `MatchClause` (a list of nested and/or/leaf items) into a rooted DAG where
//! interior nodes mark disjunction points. Uses an arena of `Vec<TreeNode>` indexed by
//! plain `usize` ids rather than a pointer-rich graph, so traversal, copying, and hashing
//! stay trivial (§9 design note).

use crate::criteria::{Collection, LeafCriterion};
use serde_json::Value;
use std::collections::BTreeMap;

pub type NodeId = usize;

#[derive(Debug, Clone, Default)]
pub struct TreeNode {
    pub criteria_list: Vec<LeafCriterion>,
    pub is_or: bool,
    pub children: Vec<NodeId>,
}

/// Arena-backed match tree. Node `0` is always the root and is the conjunction context
/// for the whole clause.
#[derive(Debug, Clone)]
pub struct MatchTree {
    nodes: Vec<TreeNode>,
}

impl MatchTree {
    #[must_use]
    pub fn root(&self) -> NodeId {
        0
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes with no children — the endpoints of every root-to-leaf walk.
    #[must_use]
    pub fn leaves(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| self.nodes[id].children.is_empty())
            .collect()
    }

    fn alloc(&mut self) -> NodeId {
        self.nodes.push(TreeNode::default());
        self.nodes.len() - 1
    }
}

struct WorkItem {
    parent: NodeId,
    item: Value,
}

/// Builds a tree from a raw clause. Items are popped LIFO from an explicit work list
/// (mirroring `deque.pop()` from the right in the original traversal) rather than using
/// recursion, so build order is deterministic and independent of curation nesting depth.
#[must_use]
pub fn build_tree(clause: &[Value]) -> MatchTree {
    let mut tree = MatchTree {
        nodes: vec![TreeNode::default()],
    };
    let mut queue: Vec<WorkItem> = clause
        .iter()
        .map(|item| WorkItem {
            parent: tree.root(),
            item: item.clone(),
        })
        .collect();

    while let Some(WorkItem { parent, item }) = queue.pop() {
        let Value::Object(entries) = &item else {
            continue;
        };
        let parent_is_or = tree.nodes[parent].is_or;
        for (label, value) in entries {
            match label.as_str() {
                "and" => {
                    if let Value::Array(items) = value {
                        for sub in items {
                            queue.push(WorkItem {
                                parent,
                                item: sub.clone(),
                            });
                        }
                    }
                }
                "or" => {
                    let or_node = tree.alloc();
                    tree.nodes[or_node].is_or = true;
                    tree.nodes[parent].children.push(or_node);
                    if let Value::Array(items) = value {
                        for sub in items {
                            queue.push(WorkItem {
                                parent: or_node,
                                item: sub.clone(),
                            });
                        }
                    }
                }
                label if Collection::parse(label).is_some() => {
                    let collection = Collection::parse(label).unwrap();
                    let fields: BTreeMap<String, Value> = value
                        .as_object()
                        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                        .unwrap_or_default();
                    let leaf = LeafCriterion::new(collection, fields);
                    if parent_is_or {
                        let child = tree.alloc();
                        tree.nodes[child].criteria_list.push(leaf);
                        tree.nodes[parent].children.push(child);
                    } else {
                        tree.nodes[parent].criteria_list.push(leaf);
                    }
                }
                _ => {
                    // An unrecognized label at leaf position is a curation-shape issue;
                    // the tree builder itself stays infallible (§4.2 lists no error path)
                    // and simply drops it — callers that need `CurationMalformed`
                    // reporting validate the clause before calling `build_tree`.
                }
            }
        }
    }
    tree
}
