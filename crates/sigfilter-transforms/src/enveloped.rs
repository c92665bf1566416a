#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Excludes the `<ds:Signature>` element enclosing the transform, and its
//! whole subtree, from the data being signed.

use crate::context::TransformContext;
use crate::pipeline::Transform;
use roxmltree::Node;
use sigfilter_core::{algorithm, ns, Error};
use sigfilter_xml::document::is_signature_element;
use sigfilter_xml::node::{depth, is_ancestor_or_self};
use sigfilter_xml::{
    DocNode, DocumentId, FilterDecision, FilterWalker, NodeFilter, NodeRef, Scope,
    SignatureInput, XmlDocument,
};
use std::io::Write;
use std::sync::Arc;

/// The enveloped signature transform.
#[derive(Debug, Clone)]
pub struct EnvelopedSignatureTransform {
    signature: DocNode,
}

impl EnvelopedSignatureTransform {
    /// Exclude the given `<ds:Signature>` element.
    pub fn new(signature: DocNode) -> Self {
        Self { signature }
    }

    /// Bind to the `<ds:Signature>` enclosing the `<ds:Transform>` element.
    pub fn from_element(document: &Arc<XmlDocument>, element: Node<'_, '_>) -> Result<Self, Error> {
        let signature = element
            .ancestors()
            .find(|n| is_signature_element(*n))
            .ok_or_else(|| {
                Error::MissingElement(format!(
                    "enveloped-signature transform outside a <{}> element",
                    ns::node::SIGNATURE
                ))
            })?;
        Ok(Self::new(DocNode::new(document.id(), NodeRef::of(signature))))
    }

    pub fn signature(&self) -> DocNode {
        self.signature
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(
        &self,
        mut input: SignatureInput,
        _ctx: &TransformContext,
        _sink: Option<&mut dyn Write>,
    ) -> Result<SignatureInput, Error> {
        input.set_exclude_node(self.signature);
        input.add_node_filter(Arc::new(EnvelopedNodeFilter::new(self.signature)))?;
        Ok(input)
    }
}

/// Excludes one element and its descendants, includes everything else.
#[derive(Debug, Clone)]
pub struct EnvelopedNodeFilter {
    signature: DocNode,
}

impl EnvelopedNodeFilter {
    pub fn new(signature: DocNode) -> Self {
        Self { signature }
    }
}

impl NodeFilter for EnvelopedNodeFilter {
    fn is_node_include(&self, document: DocumentId, node: Node<'_, '_>) -> FilterDecision {
        match self.signature.tree_node_in(document) {
            Some(sig) if is_ancestor_or_self(sig, node) => FilterDecision::Exclude,
            _ => FilterDecision::Include,
        }
    }

    fn walker(&self) -> Box<dyn FilterWalker + '_> {
        Box::new(EnvelopedWalker {
            filter: self,
            inside: Scope::default(),
            started: false,
        })
    }
}

struct EnvelopedWalker<'f> {
    filter: &'f EnvelopedNodeFilter,
    inside: Scope,
    started: bool,
}

impl FilterWalker for EnvelopedWalker<'_> {
    fn is_node_include_do(
        &mut self,
        document: DocumentId,
        node: Node<'_, '_>,
        level: usize,
    ) -> FilterDecision {
        let Some(sig) = self.filter.signature.tree_node_in(document) else {
            return FilterDecision::Include;
        };
        self.inside.leave_if_done(level);
        if !self.started {
            self.started = true;
            if let Some(anc) = node.ancestors().find(|a| a.id() == sig) {
                self.inside.enter(depth(anc));
            }
        } else if node.id() == sig {
            self.inside.enter(level);
        }
        if self.inside.is_active() {
            FilterDecision::Exclude
        } else {
            FilterDecision::Include
        }
    }
}
