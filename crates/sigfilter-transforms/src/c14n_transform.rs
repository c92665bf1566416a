#![forbid(unsafe_code)]

//! Canonicalization transforms.

use crate::context::TransformContext;
use crate::pipeline::{emit_octets, Transform};
use roxmltree::Node;
use sigfilter_c14n::C14nMode;
use sigfilter_core::{ns, Error};
use sigfilter_xml::document::find_child_elements;
use sigfilter_xml::SignatureInput;
use std::io::Write;

/// A canonicalization transform.
#[derive(Debug, Clone)]
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }

    /// Bind to a `<ds:Transform>` element.  Exclusive modes read an
    /// optional `<ec:InclusiveNamespaces PrefixList="...">` child; more
    /// than one is an error.
    pub fn from_element(mode: C14nMode, element: Node<'_, '_>) -> Result<Self, Error> {
        if !mode.is_exclusive() {
            return Ok(Self::new(mode, Vec::new()));
        }
        let params = find_child_elements(element, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES);
        let prefixes = match params.as_slice() {
            [] => Vec::new(),
            [param] => param
                .attribute(ns::attr::PREFIX_LIST)
                .unwrap_or("")
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            _ => {
                return Err(Error::Transform(format!(
                    "{} InclusiveNamespaces elements, at most one is allowed",
                    params.len()
                )))
            }
        };
        Ok(Self::new(mode, prefixes))
    }

    pub fn mode(&self) -> C14nMode {
        self.mode
    }

    pub fn inclusive_prefixes(&self) -> &[String] {
        &self.inclusive_prefixes
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(
        &self,
        input: SignatureInput,
        ctx: &TransformContext,
        sink: Option<&mut dyn Write>,
    ) -> Result<SignatureInput, Error> {
        let secure = ctx.is_secure(&input);
        let input = input.with_secure_validation(secure);
        match sink {
            Some(sink) => {
                sigfilter_c14n::canonicalize(&input, self.mode, &self.inclusive_prefixes, sink)?;
                Ok(SignatureInput::written().inherit_settings(&input))
            }
            None => {
                let bytes = sigfilter_c14n::canonicalize_to_vec(
                    &input,
                    self.mode,
                    &self.inclusive_prefixes,
                )?;
                emit_octets(bytes, None, &input)
            }
        }
    }
}
