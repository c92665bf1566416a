#![forbid(unsafe_code)]

//! XPath Filter 2.0 transform.
//!
//! Each `<dsig-xpath:XPath Filter="...">` parameter selects subtree roots.
//! The resulting [`XPath2NodeFilter`] decides for a node `n`:
//!
//! - `n` lies in a subtracted subtree: exclude, whatever else applies.
//! - There are intersect filters and `n` does not lie in a selected
//!   subtree of every one of them: neutral, unless a union subtree holds it.
//! - Otherwise: include.
//!
//! Selected attributes are members too: an attribute lies in a set if it
//! was selected itself or its owner element lies in one of the set's
//! subtrees.
//!
//! The filter is attached to the input and applied by whoever walks the
//! input next; nothing is materialized here.

use crate::context::TransformContext;
use crate::pipeline::Transform;
use roxmltree::{Node, NodeId};
use sigfilter_core::{algorithm, ns, Error};
use sigfilter_xml::document::find_child_elements;
use sigfilter_xml::node::depth;
use sigfilter_xml::{
    DocNode, DocumentId, FilterDecision, FilterWalker, NodeFilter, NodeRef, NodeSet, Scope,
    SignatureInput, XPathContext, XmlDocument,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

/// How a filter's selection combines with the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Intersect,
    Subtract,
    Union,
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            ns::XPATH2_FILTER_INTERSECT => Ok(FilterOp::Intersect),
            ns::XPATH2_FILTER_SUBTRACT => Ok(FilterOp::Subtract),
            ns::XPATH2_FILTER_UNION => Ok(FilterOp::Union),
            other => Err(Error::XmlStructure(format!(
                "unknown XPath filter operation '{other}'"
            ))),
        }
    }
}

/// One `<XPath>` parameter.
#[derive(Debug, Clone)]
struct FilterParam {
    op: FilterOp,
    expression: String,
    namespaces: BTreeMap<String, String>,
    /// The node `here()` refers to: the expression's text node.
    owner: DocNode,
}

/// The XPath Filter 2.0 transform.
#[derive(Debug, Clone)]
pub struct XPath2FilterTransform {
    params: Vec<FilterParam>,
}

impl XPath2FilterTransform {
    /// Bind to a `<ds:Transform>` element; at least one `<XPath>` child is
    /// required.
    pub fn from_element(document: &Arc<XmlDocument>, element: Node<'_, '_>) -> Result<Self, Error> {
        let elements = find_child_elements(element, ns::XPATH2, ns::node::XPATH);
        if elements.is_empty() {
            return Err(Error::MissingElement(format!(
                "XPath Filter 2.0 transform without <{}> parameters",
                ns::node::XPATH
            )));
        }

        let params = elements
            .into_iter()
            .map(|xpath| -> Result<FilterParam, Error> {
                let op = xpath
                    .attribute(ns::attr::FILTER)
                    .ok_or_else(|| {
                        Error::MissingAttribute(format!("{} on <XPath>", ns::attr::FILTER))
                    })?
                    .parse()?;
                let expression: String = xpath
                    .children()
                    .filter(|c| c.is_text())
                    .filter_map(|c| c.text())
                    .collect();
                let namespaces = xpath
                    .namespaces()
                    .filter_map(|n| Some((n.name()?.to_owned(), n.uri().to_owned())))
                    .collect();
                let owner = xpath.first_child().filter(|c| c.is_text()).unwrap_or(xpath);
                Ok(FilterParam {
                    op,
                    expression: expression.trim().to_owned(),
                    namespaces,
                    owner: DocNode::new(document.id(), NodeRef::of(owner)),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self { params })
    }
}

impl Transform for XPath2FilterTransform {
    fn uri(&self) -> &str {
        algorithm::XPATH2
    }

    fn execute(
        &self,
        input: SignatureInput,
        ctx: &TransformContext,
        _sink: Option<&mut dyn Write>,
    ) -> Result<SignatureInput, Error> {
        let secure = ctx.is_secure(&input);
        let mut input = input.with_secure_validation(secure).into_node_set()?;
        let document = input
            .document()
            .cloned()
            .ok_or_else(|| Error::Transform("XPath filter input has no document".into()))?;
        let doc = document.parse_doc()?;
        let ids = document.build_id_map(&doc, secure)?;

        let mut builder = XPath2NodeFilter::builder(document.id());
        for param in &self.params {
            let xpath_ctx = XPathContext::new(&doc, document.id(), doc.root(), &param.namespaces)
                .with_here(param.owner)
                .with_ids(&ids);
            let selected = ctx.xpath().evaluate(&param.expression, &xpath_ctx)?;
            builder.add(param.op, &selected);
        }
        let filter = builder.build();
        trace!(
            union = filter.union.len(),
            subtract = filter.subtract.len(),
            intersect = filter.intersect.len(),
            "built XPath filter"
        );
        input.add_node_filter(Arc::new(filter))?;
        Ok(input)
    }
}

/// Collects subtree roots per operation.
#[derive(Debug)]
pub struct XPath2FilterBuilder {
    filter: XPath2NodeFilter,
}

impl XPath2FilterBuilder {
    /// Add the nodes selected by one filter.  Selected attributes count
    /// as members of the set just like tree nodes.
    pub fn add(&mut self, op: FilterOp, selected: &NodeSet) -> &mut Self {
        let filter = &mut self.filter;
        match op {
            FilterOp::Union => filter.union = filter.union.union(selected),
            FilterOp::Subtract => filter.subtract = filter.subtract.union(selected),
            FilterOp::Intersect => filter.intersect.push(selected.clone()),
        }
        self
    }

    pub fn build(self) -> XPath2NodeFilter {
        self.filter
    }
}

/// Node filter combining the subtree roots of XPath Filter 2.0 parameters.
#[derive(Debug, Clone)]
pub struct XPath2NodeFilter {
    document: DocumentId,
    union: NodeSet,
    subtract: NodeSet,
    /// One root set per intersect filter.
    intersect: Vec<NodeSet>,
}

impl XPath2NodeFilter {
    pub fn builder(document: DocumentId) -> XPath2FilterBuilder {
        XPath2FilterBuilder {
            filter: XPath2NodeFilter {
                document,
                union: NodeSet::new(),
                subtract: NodeSet::new(),
                intersect: Vec::new(),
            },
        }
    }

    fn decide(&self, subtracted: bool, intersected: bool, in_union: bool) -> FilterDecision {
        if subtracted {
            FilterDecision::Exclude
        } else if intersected || in_union {
            FilterDecision::Include
        } else {
            FilterDecision::Neutral
        }
    }

    fn selects(&self, node: NodeRef) -> bool {
        self.subtract.contains(node)
            || self.union.contains(node)
            || self.intersect.iter().any(|roots| roots.contains(node))
    }
}

/// Whether `node` or one of its ancestors is in `roots`.
fn rooted(node: Node<'_, '_>, roots: &NodeSet) -> bool {
    !roots.is_empty() && node.ancestors().any(|a| roots.contains_node(a))
}

impl NodeFilter for XPath2NodeFilter {
    fn is_node_include(&self, document: DocumentId, node: Node<'_, '_>) -> FilterDecision {
        if document != self.document {
            return FilterDecision::Neutral;
        }
        self.decide(
            rooted(node, &self.subtract),
            self.intersect.iter().all(|roots| rooted(node, roots)),
            rooted(node, &self.union),
        )
    }

    fn walker(&self) -> Box<dyn FilterWalker + '_> {
        Box::new(XPath2Walker {
            filter: self,
            subtract: Scope::default(),
            intersect: vec![Scope::default(); self.intersect.len()],
            union: Scope::default(),
            started: false,
        })
    }

    /// An attribute lies in a set's subtrees if it was selected itself or
    /// its owner element is rooted there.
    fn is_attribute_include(
        &self,
        document: DocumentId,
        owner: Node<'_, '_>,
        index: usize,
        owner_decision: FilterDecision,
    ) -> FilterDecision {
        if document != self.document {
            return FilterDecision::Neutral;
        }
        let attr = NodeRef::Attribute {
            owner: owner.id(),
            index,
        };
        if !self.selects(attr) {
            return owner_decision;
        }
        let in_set = |roots: &NodeSet| roots.contains(attr) || rooted(owner, roots);
        self.decide(
            in_set(&self.subtract),
            self.intersect.iter().all(|roots| in_set(roots)),
            in_set(&self.union),
        )
    }
}

/// Document-order evaluation: one scope per root set, so each node costs
/// a few set lookups instead of an ancestor walk.
struct XPath2Walker<'f> {
    filter: &'f XPath2NodeFilter,
    subtract: Scope,
    intersect: Vec<Scope>,
    union: Scope,
    started: bool,
}

impl XPath2Walker<'_> {
    fn leave_finished(&mut self, level: usize) {
        self.subtract.leave_if_done(level);
        self.union.leave_if_done(level);
        for scope in &mut self.intersect {
            scope.leave_if_done(level);
        }
    }

    fn enter_roots(&mut self, id: NodeId, level: usize) {
        let filter = self.filter;
        let id = NodeRef::Node(id);
        if filter.subtract.contains(id) {
            self.subtract.enter(level);
        }
        if filter.union.contains(id) {
            self.union.enter(level);
        }
        for (scope, roots) in self.intersect.iter_mut().zip(&filter.intersect) {
            if roots.contains(id) {
                scope.enter(level);
            }
        }
    }
}

impl FilterWalker for XPath2Walker<'_> {
    fn is_node_include_do(
        &mut self,
        document: DocumentId,
        node: Node<'_, '_>,
        level: usize,
    ) -> FilterDecision {
        if document != self.filter.document {
            return FilterDecision::Neutral;
        }
        self.leave_finished(level);
        if !self.started {
            self.started = true;
            let ancestors: Vec<Node<'_, '_>> = node.ancestors().skip(1).collect();
            for ancestor in ancestors.into_iter().rev() {
                self.enter_roots(ancestor.id(), depth(ancestor));
            }
        }
        self.enter_roots(node.id(), level);

        self.filter.decide(
            self.subtract.is_active(),
            self.intersect.iter().all(Scope::is_active),
            self.union.is_active(),
        )
    }
}
