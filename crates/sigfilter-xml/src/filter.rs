#![forbid(unsafe_code)]

//! Tri-state node inclusion algebra.
//!
//! A [`NodeFilter`] narrows the nodes of a signature input.  It answers
//! in two ways:
//!
//! - [`NodeFilter::is_node_include`] decides for an arbitrary node by
//!   re-deriving its ancestry.
//! - [`NodeFilter::walker`] returns a [`FilterWalker`] that is fed every
//!   node of one preorder traversal together with its depth.  The walker
//!   owns the traversal state (which subtree it is currently inside), so
//!   the filter itself stays immutable and can be shared between
//!   concurrent verifications.
//!
//! Both answers must agree for every node of a document.

use crate::node::DocumentId;
use roxmltree::Node;
use std::fmt;
use std::sync::Arc;

/// Inclusion decision for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterDecision {
    /// The node and its entire subtree are excluded.
    Exclude,
    /// The node is not output; its descendants are still considered.
    Neutral,
    /// The node is output.
    Include,
}

impl FilterDecision {
    /// Combine two decisions under logical AND: any exclusion wins, then
    /// any neutral answer.
    pub fn and(self, other: FilterDecision) -> FilterDecision {
        match (self, other) {
            (FilterDecision::Exclude, _) | (_, FilterDecision::Exclude) => FilterDecision::Exclude,
            (FilterDecision::Neutral, _) | (_, FilterDecision::Neutral) => FilterDecision::Neutral,
            _ => FilterDecision::Include,
        }
    }

    pub fn is_included(self) -> bool {
        self == FilterDecision::Include
    }
}

/// A node-inclusion predicate attached to a signature input.
pub trait NodeFilter: fmt::Debug + Send + Sync {
    /// Decide for an arbitrary node of `document`.
    fn is_node_include(&self, document: DocumentId, node: Node<'_, '_>) -> FilterDecision;

    /// Start a document-order walk.
    fn walker(&self) -> Box<dyn FilterWalker + '_>;

    /// Decide for the attribute at `index` of `owner`, given this
    /// filter's decision for `owner`.  An attribute lies in its owner's
    /// subtree, so by default it shares the owner's decision.
    fn is_attribute_include(
        &self,
        _document: DocumentId,
        _owner: Node<'_, '_>,
        _index: usize,
        owner_decision: FilterDecision,
    ) -> FilterDecision {
        owner_decision
    }
}

/// Traversal state of one filter during a single preorder walk.
pub trait FilterWalker {
    /// Decide for `node`, whose depth in the document is `level` (the
    /// root is 0).  Called once per visited node, in document order.  The
    /// walk may start below the root, so the first node's ancestors have
    /// to be accounted for by the walker itself.  A subtree the caller
    /// skips after an [`FilterDecision::Exclude`] is simply never reported.
    fn is_node_include_do(
        &mut self,
        document: DocumentId,
        node: Node<'_, '_>,
        level: usize,
    ) -> FilterDecision;
}

/// A subtree scope remembered by a walker.
///
/// Entered at the level of the node that opened it; left as soon as the
/// traversal visits a node at that level or above, which can only be a
/// sibling or a relative outside the subtree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    entered: Option<usize>,
}

impl Scope {
    /// Drop the scope if `level` is at or above the level it was entered at.
    pub fn leave_if_done(&mut self, level: usize) {
        if matches!(self.entered, Some(entered) if level <= entered) {
            self.entered = None;
        }
    }

    /// Enter at `level` unless already inside.
    pub fn enter(&mut self, level: usize) {
        if self.entered.is_none() {
            self.entered = Some(level);
        }
    }

    pub fn is_active(&self) -> bool {
        self.entered.is_some()
    }
}

/// Decide for an arbitrary node against every filter (logical AND).
pub fn combined_decision(
    filters: &[Arc<dyn NodeFilter>],
    document: DocumentId,
    node: Node<'_, '_>,
) -> FilterDecision {
    filters
        .iter()
        .fold(FilterDecision::Include, |acc, f| {
            acc.and(f.is_node_include(document, node))
        })
}
