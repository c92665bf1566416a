#![forbid(unsafe_code)]

//! The value threaded through a transform chain.

use crate::document::XmlDocument;
use crate::filter::{combined_decision, FilterDecision, FilterWalker, NodeFilter};
use crate::node::{depth, is_ancestor_or_self, DocNode, DocumentId, NodeRef};
use crate::nodeset::NodeSet;
use roxmltree::{Node, NodeId};
use sigfilter_core::Error;
use std::sync::Arc;

/// The representation a signature input currently has.  Exactly one is
/// active; transforms convert between them explicitly.
#[derive(Debug, Clone)]
pub enum InputData {
    /// Raw bytes.
    Octets(Vec<u8>),
    /// The subtree rooted at `root`.  A text root stands for its parent
    /// element.
    Element {
        document: Arc<XmlDocument>,
        root: NodeId,
    },
    /// A node-set over the subtree at `root` (the document root when
    /// `None`).  With `nodes` present only its members can be output;
    /// otherwise every node of the subtree is a candidate.  Attached
    /// filters narrow either form.
    NodeSet {
        document: Arc<XmlDocument>,
        root: Option<NodeId>,
        nodes: Option<NodeSet>,
    },
}

/// Data being processed by a transform chain, plus the exclusion and
/// filter state attached to it along the way.
#[derive(Debug, Clone)]
pub struct SignatureInput {
    data: InputData,
    exclude_node: Option<DocNode>,
    node_filters: Vec<Arc<dyn NodeFilter>>,
    source_uri: Option<String>,
    secure_validation: bool,
    exclude_comments: bool,
    written: bool,
}

impl SignatureInput {
    fn with_data(data: InputData) -> Self {
        Self {
            data,
            exclude_node: None,
            node_filters: Vec::new(),
            source_uri: None,
            secure_validation: false,
            exclude_comments: false,
            written: false,
        }
    }

    /// Input holding raw bytes.
    pub fn from_octets(bytes: Vec<u8>) -> Self {
        Self::with_data(InputData::Octets(bytes))
    }

    /// Input holding the subtree rooted at `node`.
    pub fn from_node(document: Arc<XmlDocument>, node: Node<'_, '_>) -> Self {
        Self::with_data(InputData::Element {
            document,
            root: node.id(),
        })
    }

    /// Input holding an explicit node-set.
    pub fn from_node_set(document: Arc<XmlDocument>, nodes: NodeSet) -> Self {
        Self::with_data(InputData::NodeSet {
            document,
            root: None,
            nodes: Some(nodes),
        })
    }

    /// Result of a transform that streamed its octets to the caller's sink.
    pub fn written() -> Self {
        let mut input = Self::from_octets(Vec::new());
        input.written = true;
        input
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    pub fn with_secure_validation(mut self, secure_validation: bool) -> Self {
        self.secure_validation = secure_validation;
        self
    }

    pub fn with_exclude_comments(mut self, exclude_comments: bool) -> Self {
        self.exclude_comments = exclude_comments;
        self
    }

    /// Carry provenance and policy flags over to a transform's result.
    pub fn inherit_settings(mut self, from: &SignatureInput) -> Self {
        self.source_uri = from.source_uri.clone();
        self.secure_validation = from.secure_validation;
        self
    }

    pub fn data(&self) -> &InputData {
        &self.data
    }

    pub fn is_octets(&self) -> bool {
        matches!(self.data, InputData::Octets(_))
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data, InputData::Element { .. })
    }

    pub fn is_node_set(&self) -> bool {
        matches!(self.data, InputData::NodeSet { .. })
    }

    /// Whether the octets were already written to an output sink.
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// The buffered octets, if this is an octet input.
    pub fn octets(&self) -> Option<&[u8]> {
        match &self.data {
            InputData::Octets(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<&Arc<XmlDocument>> {
        match &self.data {
            InputData::Octets(_) => None,
            InputData::Element { document, .. } | InputData::NodeSet { document, .. } => {
                Some(document)
            }
        }
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.document().map(|d| d.id())
    }

    pub fn exclude_node(&self) -> Option<DocNode> {
        self.exclude_node
    }

    pub fn set_exclude_node(&mut self, node: DocNode) {
        self.exclude_node = Some(node);
    }

    pub fn node_filters(&self) -> &[Arc<dyn NodeFilter>] {
        &self.node_filters
    }

    /// Attach a filter.  Octets are parsed into a document first, since a
    /// filter only has meaning over nodes.
    pub fn add_node_filter(&mut self, filter: Arc<dyn NodeFilter>) -> Result<(), Error> {
        if self.is_octets() {
            self.parse_octets()?;
        }
        self.node_filters.push(filter);
        Ok(())
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.source_uri.as_deref()
    }

    pub fn secure_validation(&self) -> bool {
        self.secure_validation
    }

    pub fn exclude_comments(&self) -> bool {
        self.exclude_comments
    }

    fn parse_octets(&mut self) -> Result<(), Error> {
        if let InputData::Octets(bytes) = &self.data {
            let document = XmlDocument::parse_bytes(bytes, self.secure_validation)?;
            self.data = InputData::Element {
                document: Arc::new(document),
                root: root_id(),
            };
        }
        Ok(())
    }

    /// Convert to the node-set representation.  Octets are parsed, an
    /// element subtree becomes the node-set over that subtree.
    pub fn into_node_set(mut self) -> Result<Self, Error> {
        self.parse_octets()?;
        self.data = match self.data {
            InputData::Element { document, root } => InputData::NodeSet {
                document,
                root: Some(root),
                nodes: None,
            },
            other => other,
        };
        Ok(self)
    }

    /// The node a traversal of this input starts at.  A text root is
    /// re-rooted to its parent element.
    pub fn start_node<'a, 'input>(
        &self,
        doc: &'a roxmltree::Document<'input>,
    ) -> Result<Node<'a, 'input>, Error> {
        let root = match &self.data {
            InputData::Octets(_) => return Err(Error::Transform("octet input has no nodes".into())),
            InputData::Element { root, .. } => Some(*root),
            InputData::NodeSet { root, .. } => *root,
        };
        let node = match root {
            Some(id) => doc
                .get_node(id)
                .ok_or_else(|| Error::XmlStructure("input root is not in its document".into()))?,
            None => doc.root(),
        };
        if node.is_text() {
            return node
                .parent()
                .ok_or_else(|| Error::XmlStructure("text root without parent".into()));
        }
        Ok(node)
    }

    /// Decide for an arbitrary node, independent of any traversal.
    pub fn is_node_include(&self, node: Node<'_, '_>) -> FilterDecision {
        let Some(document) = self.document_id() else {
            return FilterDecision::Exclude;
        };
        let excluded = self
            .exclude_node
            .and_then(|n| n.tree_node_in(document))
            .is_some_and(|id| is_ancestor_or_self(id, node));
        if excluded {
            return FilterDecision::Exclude;
        }
        let decision = combined_decision(&self.node_filters, document, node);
        if decision.is_included() && !self.is_candidate(node) {
            return FilterDecision::Neutral;
        }
        decision
    }

    /// Decide for the attribute at `index` of `owner`, independent of any
    /// traversal.
    pub fn is_attribute_include(&self, owner: Node<'_, '_>, index: usize) -> FilterDecision {
        let Some(document) = self.document_id() else {
            return FilterDecision::Exclude;
        };
        let excluded = self
            .exclude_node
            .and_then(|n| n.tree_node_in(document))
            .is_some_and(|id| is_ancestor_or_self(id, owner));
        if excluded {
            return FilterDecision::Exclude;
        }
        let decision = self.node_filters.iter().fold(FilterDecision::Include, |acc, f| {
            let owner_decision = f.is_node_include(document, owner);
            acc.and(f.is_attribute_include(document, owner, index, owner_decision))
        });
        if decision.is_included() && !self.is_attribute_candidate(owner, index) {
            return FilterDecision::Neutral;
        }
        decision
    }

    fn is_attribute_candidate(&self, owner: Node<'_, '_>, index: usize) -> bool {
        match &self.data {
            InputData::NodeSet {
                nodes: Some(nodes), ..
            } => nodes.contains(NodeRef::Attribute {
                owner: owner.id(),
                index,
            }),
            _ => true,
        }
    }

    fn is_candidate(&self, node: Node<'_, '_>) -> bool {
        if self.exclude_comments && node.is_comment() {
            return false;
        }
        match &self.data {
            InputData::NodeSet {
                nodes: Some(nodes), ..
            } => nodes.contains_node(node),
            _ => true,
        }
    }

    /// Short name of the active representation, for diagnostics.
    pub fn representation(&self) -> &'static str {
        match self.data {
            InputData::Octets(_) if self.written => "written",
            InputData::Octets(_) => "octets",
            InputData::Element { .. } => "element",
            InputData::NodeSet { .. } => "node-set",
        }
    }

    /// Feed the character data of every output text node to `f`, in
    /// document order.  Markup, comments and processing instructions
    /// contribute nothing.
    pub fn visit_text(&self, mut f: impl FnMut(&str) -> Result<(), Error>) -> Result<(), Error> {
        let Some(document) = self.document() else {
            return Err(Error::Transform("octet input has no text nodes".into()));
        };
        let doc = document.parse_doc()?;
        let start = self.start_node(&doc)?;
        let Some(mut walk) = self.walk() else {
            return Ok(());
        };
        let mut stack = vec![(start, depth(start))];
        while let Some((node, level)) = stack.pop() {
            let decision = walk.decide(node, level);
            if decision == FilterDecision::Exclude {
                continue;
            }
            if decision.is_included() && node.is_text() {
                f(node.text().unwrap_or(""))?;
            }
            let children: Vec<Node<'_, '_>> = node.children().collect();
            stack.extend(children.into_iter().rev().map(|c| (c, level + 1)));
        }
        Ok(())
    }

    /// Begin a document-order walk over this input's nodes.
    pub fn walk(&self) -> Option<InputWalk<'_>> {
        let document = self.document_id()?;
        Some(InputWalk {
            input: self,
            document,
            exclude: self.exclude_node.and_then(|n| n.tree_node_in(document)),
            walkers: self.node_filters.iter().map(|f| f.walker()).collect(),
            owner_decisions: Vec::with_capacity(self.node_filters.len()),
            started: false,
        })
    }
}

/// One preorder traversal of a signature input.
///
/// Every filter's walker sees every visited node, so their scope
/// tracking stays consistent whatever the combined answer is.
pub struct InputWalk<'s> {
    input: &'s SignatureInput,
    document: DocumentId,
    exclude: Option<NodeId>,
    walkers: Vec<Box<dyn FilterWalker + 's>>,
    /// Each filter's decision for the last visited node.
    owner_decisions: Vec<FilterDecision>,
    started: bool,
}

impl InputWalk<'_> {
    /// Decide for the next node of the traversal, visited at `level`.
    pub fn decide(&mut self, node: Node<'_, '_>, level: usize) -> FilterDecision {
        // An excluded subtree is skipped by the caller, so past the first
        // node only the excluded node itself is ever reported.
        let excluded = match self.exclude {
            Some(id) if !self.started => is_ancestor_or_self(id, node),
            Some(id) => node.id() == id,
            None => false,
        };
        self.started = true;
        let mut decision = if excluded {
            FilterDecision::Exclude
        } else {
            FilterDecision::Include
        };
        self.owner_decisions.clear();
        for walker in &mut self.walkers {
            let own = walker.is_node_include_do(self.document, node, level);
            self.owner_decisions.push(own);
            decision = decision.and(own);
        }
        if decision.is_included() && !self.input.is_candidate(node) {
            return FilterDecision::Neutral;
        }
        decision
    }

    /// Decide for the attribute at `index` of `owner`, which must be the
    /// node last passed to [`decide`](Self::decide).
    pub fn decide_attribute(&self, owner: Node<'_, '_>, index: usize) -> FilterDecision {
        let decision = self
            .input
            .node_filters
            .iter()
            .zip(&self.owner_decisions)
            .fold(FilterDecision::Include, |acc, (filter, owner_decision)| {
                acc.and(filter.is_attribute_include(self.document, owner, index, *owner_decision))
            });
        if decision.is_included() && !self.input.is_attribute_candidate(owner, index) {
            return FilterDecision::Neutral;
        }
        decision
    }
}

impl std::fmt::Debug for InputWalk<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputWalk")
            .field("document", &self.document)
            .field("exclude", &self.exclude)
            .field("filters", &self.walkers.len())
            .finish()
    }
}

fn root_id() -> NodeId {
    NodeId::new(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct ExcludeNamed(&'static str);

    struct ExcludeNamedWalker<'f>(&'f ExcludeNamed);

    impl NodeFilter for ExcludeNamed {
        fn is_node_include(&self, _document: DocumentId, node: Node<'_, '_>) -> FilterDecision {
            if node.ancestors().any(|n| n.has_tag_name(self.0)) {
                FilterDecision::Exclude
            } else {
                FilterDecision::Include
            }
        }

        fn walker(&self) -> Box<dyn FilterWalker + '_> {
            Box::new(ExcludeNamedWalker(self))
        }
    }

    impl FilterWalker for ExcludeNamedWalker<'_> {
        fn is_node_include_do(
            &mut self,
            document: DocumentId,
            node: Node<'_, '_>,
            _level: usize,
        ) -> FilterDecision {
            self.0.is_node_include(document, node)
        }
    }

    fn doc(text: &str) -> Arc<XmlDocument> {
        Arc::new(XmlDocument::parse(text.to_owned()).unwrap())
    }

    #[test]
    fn test_text_root_is_rerooted() {
        let xml = doc("<a><b>text</b></a>");
        let parsed = xml.parse_doc().unwrap();
        let text = parsed.descendants().find(|n| n.is_text()).unwrap();
        let input = SignatureInput::from_node(xml.clone(), text);
        assert!(input.is_element());
        assert!(input.start_node(&parsed).unwrap().has_tag_name("b"));
    }

    #[test]
    fn test_octets_parsed_when_filter_added() {
        let mut input = SignatureInput::from_octets(b"<a><b/></a>".to_vec());
        input.add_node_filter(Arc::new(ExcludeNamed("b"))).unwrap();
        assert!(input.is_element());
        assert_eq!(input.node_filters().len(), 1);
    }

    #[test]
    fn test_octets_with_dtd_refused_under_secure_validation() {
        let mut input = SignatureInput::from_octets(b"<!DOCTYPE a><a/>".to_vec())
            .with_secure_validation(true);
        let err = input.add_node_filter(Arc::new(ExcludeNamed("b"))).unwrap_err();
        assert!(matches!(err, Error::SecurityPolicy(_)));
    }

    #[test]
    fn test_into_node_set_keeps_subtree() {
        let xml = doc("<a><b><c/></b></a>");
        let parsed = xml.parse_doc().unwrap();
        let b = parsed.descendants().find(|n| n.has_tag_name("b")).unwrap();
        let input = SignatureInput::from_node(xml.clone(), b).into_node_set().unwrap();
        assert!(input.is_node_set());
        assert_eq!(input.start_node(&parsed).unwrap().id(), b.id());
    }

    #[test]
    fn test_exclusion_and_filters() {
        let xml = doc("<a><b><c/></b><d/><!--x--></a>");
        let parsed = xml.parse_doc().unwrap();
        let find = |name: &str| parsed.descendants().find(|n| n.has_tag_name(name)).unwrap();
        let mut input = SignatureInput::from_node(xml.clone(), parsed.root())
            .with_exclude_comments(true);
        input.set_exclude_node(DocNode::new(xml.id(), NodeRef::of(find("d"))));
        input.add_node_filter(Arc::new(ExcludeNamed("b"))).unwrap();

        assert_eq!(input.is_node_include(find("a")), FilterDecision::Include);
        assert_eq!(input.is_node_include(find("c")), FilterDecision::Exclude);
        assert_eq!(input.is_node_include(find("d")), FilterDecision::Exclude);
        let comment = parsed.descendants().find(|n| n.is_comment()).unwrap();
        assert_eq!(input.is_node_include(comment), FilterDecision::Neutral);

        let mut walk = input.walk().unwrap();
        assert_eq!(walk.decide(parsed.root(), 0), FilterDecision::Include);
        assert_eq!(walk.decide(find("a"), 1), FilterDecision::Include);
        assert_eq!(walk.decide(find("b"), 2), FilterDecision::Exclude);
        assert_eq!(walk.decide(find("d"), 2), FilterDecision::Exclude);
        assert_eq!(walk.decide(comment, 2), FilterDecision::Neutral);
    }

    #[test]
    fn test_exclusion_from_other_document_ignored() {
        let xml = doc("<a><b/></a>");
        let parsed = xml.parse_doc().unwrap();
        let b = parsed.root_element().first_child().unwrap();
        let mut input = SignatureInput::from_node(xml.clone(), parsed.root());
        input.set_exclude_node(DocNode::new(DocumentId::next(), NodeRef::of(b)));
        assert_eq!(input.is_node_include(b), FilterDecision::Include);
    }

    #[test]
    fn test_explicit_node_set_membership() {
        let xml = doc("<a><b/><c/></a>");
        let parsed = xml.parse_doc().unwrap();
        let b = parsed.root_element().first_child().unwrap();
        let c = b.next_sibling().unwrap();
        let input = SignatureInput::from_node_set(xml.clone(), NodeSet::tree_with_comments(b));
        assert_eq!(input.is_node_include(b), FilterDecision::Include);
        assert_eq!(input.is_node_include(c), FilterDecision::Neutral);
    }

    #[test]
    fn test_visit_text_skips_markup_and_exclusions() {
        let xml = doc("<a>QU<b>Jj</b><!--no-->RA<?p x?><c>skip</c>==</a>");
        let parsed = xml.parse_doc().unwrap();
        let c = parsed.descendants().find(|n| n.has_tag_name("c")).unwrap();
        let mut input = SignatureInput::from_node(xml.clone(), parsed.root_element());
        input.set_exclude_node(DocNode::new(xml.id(), NodeRef::of(c)));
        let mut joined = String::new();
        input
            .visit_text(|t| {
                joined.push_str(t);
                Ok(())
            })
            .unwrap();
        assert_eq!(joined, "QUJjRA==");
        assert_eq!(input.representation(), "element");
    }

    #[test]
    fn test_walk_started_below_excluded_node() {
        let xml = doc("<a><b><c>t</c></b><d/></a>");
        let parsed = xml.parse_doc().unwrap();
        let find = |name: &str| parsed.descendants().find(|n| n.has_tag_name(name)).unwrap();
        let mut input = SignatureInput::from_node(xml.clone(), find("c"));
        input.set_exclude_node(DocNode::new(xml.id(), NodeRef::of(find("b"))));
        assert_eq!(input.is_node_include(find("c")), FilterDecision::Exclude);
        let mut walk = input.walk().unwrap();
        assert_eq!(walk.decide(find("c"), 3), FilterDecision::Exclude);
    }

    #[test]
    fn test_attributes_follow_owner_and_explicit_membership() {
        let xml = doc(r#"<a x="1"><b y="2" z="3"/></a>"#);
        let parsed = xml.parse_doc().unwrap();
        let a = parsed.root_element();
        let b = a.first_child().unwrap();

        let mut input = SignatureInput::from_node(xml.clone(), parsed.root());
        input.add_node_filter(Arc::new(ExcludeNamed("b"))).unwrap();
        assert_eq!(input.is_attribute_include(a, 0), FilterDecision::Include);
        assert_eq!(input.is_attribute_include(b, 1), FilterDecision::Exclude);
        let mut walk = input.walk().unwrap();
        walk.decide(parsed.root(), 0);
        walk.decide(a, 1);
        assert_eq!(walk.decide_attribute(a, 0), FilterDecision::Include);

        let nodes = NodeSet::from_refs([NodeRef::of(b), NodeRef::Attribute { owner: b.id(), index: 1 }]);
        let input = SignatureInput::from_node_set(xml.clone(), nodes);
        assert_eq!(input.is_attribute_include(b, 0), FilterDecision::Neutral);
        assert_eq!(input.is_attribute_include(b, 1), FilterDecision::Include);
    }
}
