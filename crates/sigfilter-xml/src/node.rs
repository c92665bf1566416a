#![forbid(unsafe_code)]

//! Node identity.
//!
//! Nodes are addressed by `roxmltree::NodeId`, which is only meaningful
//! within one document.  Anything that outlives a single parse (excluded
//! nodes, `here()` owners, filter root sets) pairs the id with the
//! [`DocumentId`] it belongs to, so structurally identical nodes from two
//! documents are never conflated.

use roxmltree::{Node, NodeId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a parsed [`XmlDocument`](crate::XmlDocument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node of the XPath data model within one document.
///
/// roxmltree does not model attributes as tree nodes, so an attribute is
/// addressed by its owner element and its position in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Node(NodeId),
    Attribute { owner: NodeId, index: usize },
}

impl NodeRef {
    /// Reference to a tree node.
    pub fn of(node: Node<'_, '_>) -> Self {
        NodeRef::Node(node.id())
    }

    /// The tree node itself, or the owner element of an attribute.
    pub fn tree_node(&self) -> NodeId {
        match *self {
            NodeRef::Node(id) => id,
            NodeRef::Attribute { owner, .. } => owner,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, NodeRef::Attribute { .. })
    }

    /// Sort key giving document order: an element, then its attributes,
    /// then its children (whose ids are all greater than the element's).
    pub fn order_key(&self) -> (u32, usize) {
        match *self {
            NodeRef::Node(id) => (id.get(), 0),
            NodeRef::Attribute { owner, index } => (owner.get(), index + 1),
        }
    }
}

/// A node together with the document it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocNode {
    pub document: DocumentId,
    pub node: NodeRef,
}

impl DocNode {
    pub fn new(document: DocumentId, node: NodeRef) -> Self {
        Self { document, node }
    }

    /// The tree node id if this refers to `document`.
    pub fn tree_node_in(&self, document: DocumentId) -> Option<NodeId> {
        (self.document == document).then(|| self.node.tree_node())
    }
}

/// Check if `ancestor` is an ancestor-or-self of `node`.
pub fn is_ancestor_or_self(ancestor: NodeId, node: Node<'_, '_>) -> bool {
    node.ancestors().any(|n| n.id() == ancestor)
}

/// Depth of `node` below the document root (the root itself is 0).
pub fn depth(node: Node<'_, '_>) -> usize {
    node.ancestors().count() - 1
}
