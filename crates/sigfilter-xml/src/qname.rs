#![forbid(unsafe_code)]

//! Prefixed names of elements and attributes.
//!
//! roxmltree resolves namespaces but does not keep the prefixes used in
//! the source, which canonical serialization has to reproduce.  The start
//! tag is re-read from the input text; when that is not possible (content
//! produced by entity expansion) the prefix is derived from the in-scope
//! namespace bindings instead.

use sigfilter_core::ns;

/// Names read from an element's start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag<'input> {
    /// The element's qualified name.
    pub name: &'input str,
    /// Qualified names of the non-namespace attributes, in source order.
    pub attributes: Vec<&'input str>,
}

/// Scan the start tag of `node` in the document's input text.
pub fn start_tag<'input>(node: roxmltree::Node<'_, 'input>) -> Option<StartTag<'input>> {
    if !node.is_element() {
        return None;
    }
    let text = node.document().input_text();
    let range = node.range();
    let rest = text.get(range.start..range.end)?.strip_prefix('<')?;
    let name_end = rest.find(|c: char| c.is_whitespace() || c == '/' || c == '>')?;
    let name = &rest[..name_end];

    let mut attributes = Vec::new();
    let mut cursor = &rest[name_end..];
    loop {
        cursor = cursor.trim_start();
        if cursor.is_empty() || cursor.starts_with('>') || cursor.starts_with('/') {
            break;
        }
        let eq = cursor.find('=')?;
        let attr_name = cursor[..eq].trim_end();
        cursor = cursor[eq + 1..].trim_start();
        let quote = cursor.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let close = cursor[1..].find(quote)? + 1;
        if attr_name != "xmlns" && !attr_name.starts_with("xmlns:") {
            attributes.push(attr_name);
        }
        cursor = &cursor[close + 1..];
    }
    Some(StartTag { name, attributes })
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// The prefix of an element's name, if it has one.
pub fn element_prefix(node: roxmltree::Node<'_, '_>) -> Option<String> {
    if let Some(tag) = start_tag(node) {
        let (prefix, local) = split_qname(tag.name);
        if local == node.tag_name().name() {
            return prefix.map(str::to_owned);
        }
    }
    let uri = node.tag_name().namespace()?;
    let default_matches = node
        .namespaces()
        .any(|n| n.name().is_none() && n.uri() == uri);
    if default_matches {
        return None;
    }
    node.lookup_prefix(uri).map(str::to_owned)
}

/// The element's qualified name as written in the source.
pub fn element_qname(node: roxmltree::Node<'_, '_>) -> String {
    match element_prefix(node) {
        Some(prefix) => format!("{}:{}", prefix, node.tag_name().name()),
        None => node.tag_name().name().to_owned(),
    }
}

/// Qualified names of all attributes of `node`, in `node.attributes()` order.
pub fn attribute_qnames(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    let attrs: Vec<_> = node.attributes().collect();
    let scanned = start_tag(node).map(|t| t.attributes).unwrap_or_default();
    let scanned_matches = scanned.len() == attrs.len()
        && scanned
            .iter()
            .zip(&attrs)
            .all(|(qname, attr)| split_qname(qname).1 == attr.name());
    if scanned_matches {
        return scanned.into_iter().map(str::to_owned).collect();
    }

    attrs
        .iter()
        .map(|attr| match attr.namespace() {
            None => attr.name().to_owned(),
            Some(ns::XML) => format!("xml:{}", attr.name()),
            Some(uri) => {
                let prefix = node
                    .namespaces()
                    .find_map(|n| n.name().filter(|_| n.uri() == uri));
                match prefix {
                    Some(p) => format!("{}:{}", p, attr.name()),
                    None => attr.name().to_owned(),
                }
            }
        })
        .collect()
}

/// Prefix part of a qualified name ("" when unprefixed).
pub fn prefix_of(qname: &str) -> &str {
    split_qname(qname).0.unwrap_or("")
}
