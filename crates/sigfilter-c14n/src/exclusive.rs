#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0.
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only visibly utilized namespaces are rendered: the element's own
//! prefix (or the default namespace), the prefixes of its attributes, and
//! the prefixes named in the InclusiveNamespaces PrefixList (`#default`
//! standing for the default namespace).  Ancestors' `xml:*` attributes
//! are never imported.

use crate::render::{Attr, NsDecl};
use crate::serializer::{Bindings, NamespaceScheme};
use std::collections::BTreeSet;

/// Token naming the default namespace in a PrefixList.
pub const DEFAULT_PREFIX_TOKEN: &str = "#default";

#[derive(Debug, Default, Clone)]
pub struct Exclusive {
    inclusive_prefixes: BTreeSet<String>,
}

impl Exclusive {
    pub fn new(inclusive_prefixes: &[String]) -> Self {
        let inclusive_prefixes = inclusive_prefixes
            .iter()
            .map(|p| {
                if p == DEFAULT_PREFIX_TOKEN {
                    String::new()
                } else {
                    p.clone()
                }
            })
            .collect();
        Self { inclusive_prefixes }
    }
}

impl NamespaceScheme for Exclusive {
    fn declarations(
        &self,
        element_prefix: &str,
        attrs: &[Attr],
        in_scope: &Bindings,
        rendered: &Bindings,
    ) -> (Vec<NsDecl>, Bindings) {
        let mut utilized: BTreeSet<&str> = BTreeSet::new();
        utilized.insert(element_prefix);
        utilized.extend(attrs.iter().map(Attr::prefix).filter(|p| !p.is_empty()));
        utilized.extend(self.inclusive_prefixes.iter().map(String::as_str));
        utilized.remove("xml");

        let mut decls = Vec::new();
        let mut child_rendered = rendered.clone();
        for prefix in utilized {
            match in_scope.get(prefix) {
                Some(uri) if rendered.get(prefix) != Some(uri) => {
                    decls.push(NsDecl::new(prefix, uri));
                    child_rendered.insert(prefix.to_owned(), uri.clone());
                }
                None if prefix.is_empty()
                    && rendered.get("").is_some_and(|uri| !uri.is_empty()) =>
                {
                    decls.push(NsDecl::new("", ""));
                    child_rendered.insert(String::new(), String::new());
                }
                _ => {}
            }
        }
        (decls, child_rendered)
    }

    fn inherits_xml_attributes(&self) -> bool {
        false
    }
}
