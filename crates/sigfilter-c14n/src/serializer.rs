#![forbid(unsafe_code)]

//! Document-order traversal shared by the canonicalization variants.
//!
//! Each node is offered to the input's [`InputWalk`], which combines the
//! exclusion, the attached filters and node-set membership.  An excluded
//! node prunes its subtree; a neutral node is not output but its children
//! are still visited.  Attributes of an output element are decided one
//! by one right after their owner.

use crate::escape::{escape, Context};
use crate::render::{Attr, NsDecl, Sink};
use roxmltree::{Node, NodeType};
use sigfilter_core::{ns, Error};
use sigfilter_xml::node::depth;
use sigfilter_xml::qname::{element_prefix, element_qname};
use sigfilter_xml::{FilterDecision, InputWalk, SignatureInput};
use std::collections::BTreeMap;
use std::io::Write;

/// Prefix → URI bindings.
pub type Bindings = BTreeMap<String, String>;

/// How a variant decides which namespace declarations an output element
/// carries.
pub trait NamespaceScheme {
    /// Declarations for an output element, and the bindings its output
    /// descendants see as already rendered.
    ///
    /// `in_scope` excludes the `xml` prefix and undeclared default
    /// namespaces; `rendered` is what the nearest output ancestor rendered.
    fn declarations(
        &self,
        element_prefix: &str,
        attrs: &[Attr],
        in_scope: &Bindings,
        rendered: &Bindings,
    ) -> (Vec<NsDecl>, Bindings);

    /// Whether an output element whose parent is not output picks up the
    /// `xml:*` attributes of its ancestors.
    fn inherits_xml_attributes(&self) -> bool;
}

/// Canonicalize a node-bearing input into `out`.
pub fn serialize(
    input: &SignatureInput,
    with_comments: bool,
    scheme: &dyn NamespaceScheme,
    out: &mut dyn Write,
) -> Result<(), Error> {
    let document = input
        .document()
        .ok_or_else(|| Error::Canonicalization("input has no document".into()))?;
    let doc = document.parse_doc()?;
    let start = input.start_node(&doc)?;
    let walk = input
        .walk()
        .ok_or_else(|| Error::Canonicalization("input has no document".into()))?;

    let mut serializer = Serializer {
        walk,
        with_comments,
        scheme,
        sink: Sink::new(out),
    };
    serializer.visit(start, depth(start), &Bindings::new(), false)?;
    serializer.sink.flush()
}

struct Serializer<'s, 'w> {
    walk: InputWalk<'s>,
    with_comments: bool,
    scheme: &'s dyn NamespaceScheme,
    sink: Sink<'w>,
}

impl Serializer<'_, '_> {
    fn visit(
        &mut self,
        node: Node<'_, '_>,
        level: usize,
        rendered: &Bindings,
        parent_output: bool,
    ) -> Result<(), Error> {
        let decision = self.walk.decide(node, level);
        if decision == FilterDecision::Exclude {
            return Ok(());
        }
        let output = decision.is_included();

        match node.node_type() {
            NodeType::Root => {
                for child in node.children() {
                    self.visit(child, level + 1, rendered, false)?;
                }
            }
            NodeType::Element => self.element(node, level, rendered, output, parent_output)?,
            NodeType::Text if output => {
                let text = escape(node.text().unwrap_or(""), Context::Text);
                self.sink.write_all(&[&*text])?;
            }
            NodeType::Comment if output && self.with_comments => {
                let text = node.text().unwrap_or("");
                self.top_level_markup(node, &["<!--", text, "-->"])?;
            }
            NodeType::PI if output => {
                if let Some(pi) = node.pi() {
                    let data = pi.value.filter(|v| !v.is_empty());
                    match data {
                        Some(value) => {
                            let value = escape(value, Context::ProcessingInstruction);
                            self.top_level_markup(node, &["<?", pi.target, " ", &*value, "?>"])?;
                        }
                        None => self.top_level_markup(node, &["<?", pi.target, "?>"])?,
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn element(
        &mut self,
        node: Node<'_, '_>,
        level: usize,
        rendered: &Bindings,
        output: bool,
        parent_output: bool,
    ) -> Result<(), Error> {
        if !output {
            for child in node.children() {
                self.visit(child, level + 1, rendered, false)?;
            }
            return Ok(());
        }

        let mut attrs: Vec<Attr> = Attr::of_element(node)
            .into_iter()
            .enumerate()
            .filter(|(index, _)| self.walk.decide_attribute(node, *index).is_included())
            .map(|(_, attr)| attr)
            .collect();
        if self.scheme.inherits_xml_attributes() && !parent_output {
            inherit_xml_attributes(node, &mut attrs);
        }
        attrs.sort();

        let prefix = element_prefix(node).unwrap_or_default();
        let in_scope = in_scope_namespaces(node);
        let (mut decls, child_rendered) =
            self.scheme.declarations(&prefix, &attrs, &in_scope, rendered);
        decls.sort();

        let name = element_qname(node);
        self.sink.start_tag(&name, &decls, &attrs)?;
        for child in node.children() {
            self.visit(child, level + 1, &child_rendered, true)?;
        }
        self.sink.end_tag(&name)
    }

    /// Comments and PIs outside the document element are separated from
    /// it by a line feed.
    fn top_level_markup(&mut self, node: Node<'_, '_>, parts: &[&str]) -> Result<(), Error> {
        let top_level = node.parent().is_some_and(|p| p.is_root());
        if top_level && node.prev_siblings().skip(1).any(|s| s.is_element()) {
            self.sink.write_all(&["\n"])?;
        }
        self.sink.write_all(parts)?;
        if top_level && node.next_siblings().skip(1).any(|s| s.is_element()) {
            self.sink.write_all(&["\n"])?;
        }
        Ok(())
    }
}

/// In-scope namespace bindings of an element, without `xml` and without
/// an undeclared default namespace.
pub fn in_scope_namespaces(node: Node<'_, '_>) -> Bindings {
    node.namespaces()
        .filter(|n| n.name() != Some("xml") && !n.uri().is_empty())
        .map(|n| (n.name().unwrap_or("").to_owned(), n.uri().to_owned()))
        .collect()
}

/// Add the `xml:*` attributes of `node`'s ancestors that the element does
/// not set itself.  The nearest ancestor wins.
fn inherit_xml_attributes(node: Node<'_, '_>, attrs: &mut Vec<Attr>) {
    let mut inherited = Bindings::new();
    for ancestor in node.ancestors().skip(1).filter(|a| a.is_element()) {
        for attr in ancestor.attributes() {
            if attr.namespace() == Some(ns::XML) {
                inherited
                    .entry(attr.name().to_owned())
                    .or_insert_with(|| attr.value().to_owned());
            }
        }
    }
    for (name, value) in inherited {
        let present = attrs
            .iter()
            .any(|a| a.ns_uri == ns::XML && a.local_name == name);
        if !present {
            attrs.push(Attr::xml(&name, &value));
        }
    }
}
