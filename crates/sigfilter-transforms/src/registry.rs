#![forbid(unsafe_code)]

//! Algorithm URI → transform resolution.

use crate::base64_transform::Base64DecodeTransform;
use crate::c14n_transform::C14nTransform;
use crate::context::TransformContext;
use crate::enveloped::EnvelopedSignatureTransform;
use crate::pipeline::Transform;
use crate::xpath2::XPath2FilterTransform;
use crate::xslt::XsltTransform;
use roxmltree::Node;
use sigfilter_c14n::C14nMode;
use sigfilter_core::{algorithm, Error};
use sigfilter_xml::XmlDocument;
use std::collections::HashMap;
use std::sync::Arc;

/// The transform algorithms this crate implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformAlgorithm {
    Base64,
    Canonical(C14nMode),
    EnvelopedSignature,
    XPath2Filter,
    Xslt,
}

impl TransformAlgorithm {
    pub const ALL: [TransformAlgorithm; 8] = [
        TransformAlgorithm::Base64,
        TransformAlgorithm::Canonical(C14nMode::Inclusive),
        TransformAlgorithm::Canonical(C14nMode::InclusiveWithComments),
        TransformAlgorithm::Canonical(C14nMode::Exclusive),
        TransformAlgorithm::Canonical(C14nMode::ExclusiveWithComments),
        TransformAlgorithm::EnvelopedSignature,
        TransformAlgorithm::XPath2Filter,
        TransformAlgorithm::Xslt,
    ];

    /// The algorithm URI.
    pub fn uri(&self) -> &'static str {
        match self {
            TransformAlgorithm::Base64 => algorithm::BASE64,
            TransformAlgorithm::Canonical(mode) => mode.uri(),
            TransformAlgorithm::EnvelopedSignature => algorithm::ENVELOPED_SIGNATURE,
            TransformAlgorithm::XPath2Filter => algorithm::XPATH2,
            TransformAlgorithm::Xslt => algorithm::XSLT,
        }
    }

    /// Read the algorithm's parameters from its `<ds:Transform>` element.
    pub fn bind(
        &self,
        document: &Arc<XmlDocument>,
        element: Node<'_, '_>,
        ctx: &TransformContext,
    ) -> Result<Box<dyn Transform>, Error> {
        Ok(match self {
            TransformAlgorithm::Base64 => Box::new(Base64DecodeTransform),
            TransformAlgorithm::Canonical(mode) => {
                Box::new(C14nTransform::from_element(*mode, element)?)
            }
            TransformAlgorithm::EnvelopedSignature => {
                Box::new(EnvelopedSignatureTransform::from_element(document, element)?)
            }
            TransformAlgorithm::XPath2Filter => {
                Box::new(XPath2FilterTransform::from_element(document, element)?)
            }
            TransformAlgorithm::Xslt => {
                Box::new(XsltTransform::from_element(document, element, ctx)?)
            }
        })
    }
}

/// Maps algorithm URIs to transform algorithms.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    algorithms: HashMap<String, TransformAlgorithm>,
}

impl TransformRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in algorithm under its standard URI.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for algorithm in TransformAlgorithm::ALL {
            registry.register(algorithm.uri(), algorithm);
        }
        registry
    }

    /// Register `algorithm` under `uri`, replacing any previous entry.
    pub fn register(&mut self, uri: impl Into<String>, algorithm: TransformAlgorithm) {
        self.algorithms.insert(uri.into(), algorithm);
    }

    pub fn lookup(&self, uri: &str) -> Result<TransformAlgorithm, Error> {
        self.algorithms
            .get(uri)
            .copied()
            .ok_or_else(|| Error::UnsupportedTransform(uri.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_algorithm() {
        let registry = TransformRegistry::with_defaults();
        for algorithm in TransformAlgorithm::ALL {
            assert_eq!(registry.lookup(algorithm.uri()).unwrap(), algorithm);
        }
    }

    #[test]
    fn test_unknown_uri() {
        let err = TransformRegistry::with_defaults()
            .lookup("http://www.w3.org/TR/1999/REC-xpath-19991116")
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedTransform(u) if u.ends_with("xpath-19991116")));
    }

    #[test]
    fn test_alias_registration() {
        let mut registry = TransformRegistry::new();
        assert!(registry.lookup(algorithm::BASE64).is_err());
        registry.register("urn:example:b64", TransformAlgorithm::Base64);
        assert_eq!(
            registry.lookup("urn:example:b64").unwrap(),
            TransformAlgorithm::Base64
        );
    }
}
