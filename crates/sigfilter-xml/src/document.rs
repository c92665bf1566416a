#![forbid(unsafe_code)]

//! Owned XML document with identity and ID attribute registration.

use crate::node::DocumentId;
use sigfilter_core::{ns, Error};
use std::collections::HashMap;

/// An owned XML document.  Stores the text and pre-computed metadata.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`] which
/// returns a temporary `roxmltree::Document` borrowing from the text.
/// Node ids are assigned in parse order, so they are stable across
/// re-parses of the same document.
#[derive(Debug)]
pub struct XmlDocument {
    id: DocumentId,
    text: String,
    allow_dtd: bool,
    /// Additional ID attribute names to register (beyond the default `Id`, `ID`, `id`).
    extra_id_attrs: Vec<String>,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, Error> {
        Self::parse_with(text, false)
    }

    /// Parse and validate XML, refusing DTDs when `secure_validation` is set.
    pub fn parse_with(text: String, secure_validation: bool) -> Result<Self, Error> {
        let allow_dtd = !secure_validation;
        roxmltree::Document::parse_with_options(&text, crate::parsing_options(allow_dtd))
            .map_err(parse_error)?;
        Ok(Self {
            id: DocumentId::next(),
            text,
            allow_dtd,
            extra_id_attrs: Vec::new(),
        })
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8], secure_validation: bool) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?
            .to_owned();
        Self::parse_with(text, secure_validation)
    }

    /// The identity of this document.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Register additional ID attribute names (e.g., `"AssertionID"`).
    pub fn add_id_attr(&mut self, name: &str) {
        self.extra_id_attrs.push(name.to_owned());
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    ///
    /// This re-parses the XML from the stored text.  For performance,
    /// call this once at the top of a processing step and pass the
    /// resulting document reference down through the call chain.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        roxmltree::Document::parse_with_options(&self.text, crate::parsing_options(self.allow_dtd))
            .map_err(parse_error)
    }

    /// Build the ID → NodeId mapping for a parsed document.
    ///
    /// The first element carrying a value wins.  Under secure validation a
    /// repeated value is refused, since a second element with the same ID
    /// is the classic signature-wrapping setup.
    pub fn build_id_map(
        &self,
        doc: &roxmltree::Document<'_>,
        secure_validation: bool,
    ) -> Result<HashMap<String, roxmltree::NodeId>, Error> {
        let default_attrs = ["Id", "ID", "id"];
        let names: Vec<&str> = default_attrs
            .iter()
            .copied()
            .chain(self.extra_id_attrs.iter().map(String::as_str))
            .collect();

        let mut map = HashMap::new();
        for node in doc.descendants().filter(|n| n.is_element()) {
            for attr_name in &names {
                let Some(val) = node.attribute(*attr_name) else {
                    continue;
                };
                match map.get(val) {
                    Some(existing) if *existing != node.id() && secure_validation => {
                        return Err(Error::SecurityPolicy(format!(
                            "multiple elements with ID {val}"
                        )));
                    }
                    Some(_) => {}
                    None => {
                        map.insert(val.to_owned(), node.id());
                    }
                }
            }
        }
        Ok(map)
    }
}

fn parse_error(e: roxmltree::Error) -> Error {
    match e {
        roxmltree::Error::DtdDetected => {
            Error::SecurityPolicy("DTD is not allowed under secure validation".into())
        }
        other => Error::XmlParse(other.to_string()),
    }
}

/// Find the first descendant element with the given local name and namespace.
pub fn find_element<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    doc.descendants().find(|n| is_element_named(*n, ns_uri, local_name))
}

/// Find the first child element with the given local name and namespace.
pub fn find_child_element<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .find(|n| is_element_named(*n, ns_uri, local_name))
}

/// All child elements with the given local name and namespace.
pub fn find_child_elements<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .filter(|n| is_element_named(*n, ns_uri, local_name))
        .collect()
}

/// Whether `node` is an element named `{ns_uri}local_name`.
pub fn is_element_named(node: roxmltree::Node<'_, '_>, ns_uri: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns_uri
}

/// Whether `node` is a `<ds:Signature>` element.
pub fn is_signature_element(node: roxmltree::Node<'_, '_>) -> bool {
    is_element_named(node, ns::DSIG, ns::node::SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_get_distinct_ids() {
        let a = XmlDocument::parse("<a/>".into()).unwrap();
        let b = XmlDocument::parse("<a/>".into()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_node_ids_stable_across_reparse() {
        let xml = XmlDocument::parse("<a><b/><c>t</c></a>".into()).unwrap();
        let first: Vec<_> = xml.parse_doc().unwrap().descendants().map(|n| n.id()).collect();
        let second: Vec<_> = xml.parse_doc().unwrap().descendants().map(|n| n.id()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_dtd_refused_under_secure_validation() {
        let text = "<!DOCTYPE a [<!ENTITY e \"x\">]><a>&e;</a>".to_owned();
        assert!(XmlDocument::parse_with(text.clone(), false).is_ok());
        let err = XmlDocument::parse_with(text, true).unwrap_err();
        assert!(matches!(err, Error::SecurityPolicy(_)));
    }

    #[test]
    fn test_id_map() {
        let mut xml =
            XmlDocument::parse(r#"<r><a Id="one"/><b ref="two"/></r>"#.into()).unwrap();
        xml.add_id_attr("ref");
        let doc = xml.parse_doc().unwrap();
        let map = xml.build_id_map(&doc, false).unwrap();
        assert_eq!(doc.get_node(map["one"]).unwrap().tag_name().name(), "a");
        assert_eq!(doc.get_node(map["two"]).unwrap().tag_name().name(), "b");
    }

    #[test]
    fn test_duplicate_ids() {
        let xml = XmlDocument::parse(r#"<r><a Id="x"/><b Id="x"/></r>"#.into()).unwrap();
        let doc = xml.parse_doc().unwrap();
        let map = xml.build_id_map(&doc, false).unwrap();
        assert_eq!(doc.get_node(map["x"]).unwrap().tag_name().name(), "a");
        assert!(matches!(
            xml.build_id_map(&doc, true),
            Err(Error::SecurityPolicy(_))
        ));
    }

    #[test]
    fn test_find_child_elements() {
        let xml = XmlDocument::parse(
            r#"<r xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:Signature/><Signature/></r>"#
                .into(),
        )
        .unwrap();
        let doc = xml.parse_doc().unwrap();
        let sigs = find_child_elements(doc.root_element(), ns::DSIG, ns::node::SIGNATURE);
        assert_eq!(sigs.len(), 1);
        assert!(is_signature_element(sigs[0]));
        assert!(find_element(&doc, ns::DSIG, "Missing").is_none());
    }
}
