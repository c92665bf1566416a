#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) over signature inputs.
//!
//! Implements the four variants transform chains use:
//! - Canonical XML 1.0 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)
//!
//! The canonicalizer walks the input in document order and asks the
//! input which nodes to output, so exclusions, attached node filters and
//! explicit node-sets all apply without materializing a node-set first.

pub mod escape;
pub mod exclusive;
pub mod inclusive;
pub mod render;
pub mod serializer;

use sigfilter_core::{algorithm, Error};
use sigfilter_xml::{SignatureInput, XmlDocument};
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize `input` into `out`.
///
/// Octet input is parsed first (refusing DTDs under secure validation).
/// `inclusive_prefixes` is the InclusiveNamespaces PrefixList and only
/// matters for the exclusive modes.
pub fn canonicalize(
    input: &SignatureInput,
    mode: C14nMode,
    inclusive_prefixes: &[String],
    out: &mut dyn Write,
) -> Result<(), Error> {
    if input.is_octets() {
        let parsed = input.clone().into_node_set()?;
        return canonicalize(&parsed, mode, inclusive_prefixes, out);
    }
    debug!(
        algorithm = mode.uri(),
        filters = input.node_filters().len(),
        excluded = input.exclude_node().is_some(),
        "canonicalizing"
    );
    if mode.is_exclusive() {
        let scheme = exclusive::Exclusive::new(inclusive_prefixes);
        serializer::serialize(input, mode.with_comments(), &scheme, out)
    } else {
        serializer::serialize(input, mode.with_comments(), &inclusive::Inclusive, out)
    }
}

/// Canonicalize `input` into a buffer.
pub fn canonicalize_to_vec(
    input: &SignatureInput,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    canonicalize(input, mode, inclusive_prefixes, &mut out)?;
    Ok(out)
}

/// The octets of an input: its bytes as-is, or Canonical XML 1.0 without
/// comments of its nodes.
pub fn octets(input: &SignatureInput) -> Result<Vec<u8>, Error> {
    match input.octets() {
        Some(bytes) => Ok(bytes.to_vec()),
        None => canonicalize_to_vec(input, C14nMode::Inclusive, &[]),
    }
}

/// Canonicalize the subtree rooted at `node`, so it can be re-parsed as a
/// standalone document with every namespace it relies on declared.
pub fn canonicalize_subtree(
    document: Arc<XmlDocument>,
    node: roxmltree::NodeId,
    mode: C14nMode,
) -> Result<Vec<u8>, Error> {
    let input = {
        let doc = document.parse_doc()?;
        let root = doc
            .get_node(node)
            .ok_or_else(|| Error::Canonicalization("subtree root not in document".into()))?;
        SignatureInput::from_node(document.clone(), root)
    };
    canonicalize_to_vec(&input, mode, &[])
}
