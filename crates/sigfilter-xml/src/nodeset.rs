#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization and transforms.
//!
//! A `NodeSet` represents an explicit, unordered set of nodes from one XML
//! document, identified by [`NodeRef`].  It is the result type of XPath
//! evaluation and one of the three representations a signature input can
//! take.

use crate::node::NodeRef;
use roxmltree::Node;
use std::collections::HashSet;

/// A set of XML document nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSet {
    nodes: HashSet<NodeRef>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self {
            nodes: HashSet::new(),
        }
    }

    /// Create a node set from node references.
    pub fn from_refs(refs: impl IntoIterator<Item = NodeRef>) -> Self {
        Self {
            nodes: refs.into_iter().collect(),
        }
    }

    /// Every node of the subtree rooted at `root`, attributes and
    /// comments included.
    pub fn tree_with_comments(root: Node<'_, '_>) -> Self {
        let mut nodes = HashSet::new();
        for node in root.descendants() {
            nodes.insert(NodeRef::of(node));
            nodes.extend((0..node.attributes().count()).map(|index| NodeRef::Attribute {
                owner: node.id(),
                index,
            }));
        }
        Self { nodes }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: NodeRef) -> bool {
        self.nodes.contains(&node)
    }

    /// Check if a tree node is in this set.
    pub fn contains_node(&self, node: Node<'_, '_>) -> bool {
        self.nodes.contains(&NodeRef::of(node))
    }

    /// Compute the union of two node sets.
    pub fn union(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.union(&other.nodes).copied().collect(),
        }
    }

    /// Check if this set is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes in the set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate the members in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes.iter()
    }

    /// The members sorted in document order.
    pub fn in_document_order(&self) -> Vec<NodeRef> {
        let mut refs: Vec<NodeRef> = self.nodes.iter().copied().collect();
        refs.sort_by_key(|r| r.order_key());
        refs
    }
}

impl FromIterator<NodeRef> for NodeSet {
    fn from_iter<I: IntoIterator<Item = NodeRef>>(iter: I) -> Self {
        Self::from_refs(iter)
    }
}
