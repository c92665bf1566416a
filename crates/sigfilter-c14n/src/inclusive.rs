#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0.
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! Every in-scope namespace binding is rendered on the first output
//! element that has it, unless the nearest output ancestor already
//! rendered the same binding.  An output element without a default
//! namespace under an output ancestor with one gets `xmlns=""`.

use crate::render::{Attr, NsDecl};
use crate::serializer::{Bindings, NamespaceScheme};

#[derive(Debug, Default, Clone, Copy)]
pub struct Inclusive;

impl NamespaceScheme for Inclusive {
    fn declarations(
        &self,
        _element_prefix: &str,
        _attrs: &[Attr],
        in_scope: &Bindings,
        rendered: &Bindings,
    ) -> (Vec<NsDecl>, Bindings) {
        let mut decls: Vec<NsDecl> = in_scope
            .iter()
            .filter(|(prefix, uri)| rendered.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl::new(prefix, uri))
            .collect();
        let inherited_default = rendered.get("").is_some_and(|uri| !uri.is_empty());
        if inherited_default && !in_scope.contains_key("") {
            decls.push(NsDecl::new("", ""));
        }
        (decls, in_scope.clone())
    }

    fn inherits_xml_attributes(&self) -> bool {
        true
    }
}
