#![forbid(unsafe_code)]

//! Building blocks of canonical start tags and the output sink.

use crate::escape::{escape, Context};
use sigfilter_core::{ns, Error};
use std::cmp::Ordering;
use std::io::Write;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for the default namespace).
    pub prefix: String,
    /// The namespace URI ("" undeclares the default namespace).
    pub uri: String,
}

impl NsDecl {
    pub fn new(prefix: &str, uri: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            uri: uri.to_owned(),
        }
    }

    fn render(&self, out: &mut Sink<'_>) -> Result<(), Error> {
        let value = escape(&self.uri, Context::Attribute);
        if self.prefix.is_empty() {
            out.write_all(&[" xmlns=\"", &*value, "\""])
        } else {
            out.write_all(&[" xmlns:", self.prefix.as_str(), "=\"", &*value, "\""])
        }
    }
}

// Default namespace first, then by prefix.
impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prefix.cmp(&other.prefix)
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// Namespace URI ("" for none).
    pub ns_uri: String,
    pub local_name: String,
    /// The name as written, `prefix:local` or `local`.
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    /// An inherited `xml:*` attribute.
    pub fn xml(local_name: &str, value: &str) -> Self {
        Self {
            ns_uri: ns::XML.to_owned(),
            local_name: local_name.to_owned(),
            qualified_name: format!("xml:{local_name}"),
            value: value.to_owned(),
        }
    }

    /// Attributes of `node`, unsorted.
    pub fn of_element(node: roxmltree::Node<'_, '_>) -> Vec<Attr> {
        node.attributes()
            .zip(sigfilter_xml::qname::attribute_qnames(node))
            .map(|(attr, qualified_name)| Attr {
                ns_uri: attr.namespace().unwrap_or("").to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name,
                value: attr.value().to_owned(),
            })
            .collect()
    }

    /// The prefix the attribute name is written with ("" for none).
    pub fn prefix(&self) -> &str {
        sigfilter_xml::qname::prefix_of(&self.qualified_name)
    }

    fn render(&self, out: &mut Sink<'_>) -> Result<(), Error> {
        let value = escape(&self.value, Context::Attribute);
        out.write_all(&[" ", self.qualified_name.as_str(), "=\"", &*value, "\""])
    }
}

// Unqualified attributes first by local name, then by (namespace URI, local name).
impl Ord for Attr {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then_with(|| self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The caller's output, with write failures reported as canonicalization
/// errors.
pub struct Sink<'w> {
    out: &'w mut dyn Write,
}

impl<'w> Sink<'w> {
    pub fn new(out: &'w mut dyn Write) -> Self {
        Self { out }
    }

    pub fn write_all(&mut self, parts: &[&str]) -> Result<(), Error> {
        for part in parts {
            self.out
                .write_all(part.as_bytes())
                .map_err(|e| Error::Canonicalization(format!("write failed: {e}")))?;
        }
        Ok(())
    }

    /// `<name decls attrs>`; both lists must already be sorted.
    pub fn start_tag(&mut self, name: &str, decls: &[NsDecl], attrs: &[Attr]) -> Result<(), Error> {
        self.write_all(&["<", name])?;
        for decl in decls {
            decl.render(self)?;
        }
        for attr in attrs {
            attr.render(self)?;
        }
        self.write_all(&[">"])
    }

    pub fn end_tag(&mut self, name: &str) -> Result<(), Error> {
        self.write_all(&["</", name, ">"])
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.out
            .flush()
            .map_err(|e| Error::Canonicalization(format!("flush failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_order() {
        let mut attrs = vec![
            Attr {
                ns_uri: "http://b".into(),
                local_name: "a".into(),
                qualified_name: "b:a".into(),
                value: "1".into(),
            },
            Attr {
                ns_uri: "http://a".into(),
                local_name: "z".into(),
                qualified_name: "a:z".into(),
                value: "2".into(),
            },
            Attr {
                ns_uri: String::new(),
                local_name: "y".into(),
                qualified_name: "y".into(),
                value: "3".into(),
            },
        ];
        attrs.sort();
        let names: Vec<_> = attrs.iter().map(|a| a.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["y", "a:z", "b:a"]);
    }

    #[test]
    fn test_start_tag() {
        let mut out = Vec::new();
        let mut decls = vec![NsDecl::new("b", "http://b"), NsDecl::new("", "http://d")];
        decls.sort();
        Sink::new(&mut out)
            .start_tag("e", &decls, &[Attr::xml("lang", "en\"")])
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<e xmlns="http://d" xmlns:b="http://b" xml:lang="en&quot;">"#
        );
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_canonicalization_error() {
        let mut failing = FailingWriter;
        let err = Sink::new(&mut failing).end_tag("a").unwrap_err();
        assert!(matches!(err, Error::Canonicalization(_)));
    }
}
