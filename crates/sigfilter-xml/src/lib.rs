#![forbid(unsafe_code)]

//! XML data model for the sigfilter transform pipeline.
//!
//! Provides an owned document type over `roxmltree`, stable node identity
//! across documents, the `NodeFilter` inclusion algebra, the
//! `SignatureInput` value threaded through transforms, and the XPath seam
//! used by transform parameters (including `here()`).

pub mod document;
pub mod filter;
pub mod input;
pub mod node;
pub mod nodeset;
pub mod qname;
pub mod xpath;

pub use document::XmlDocument;
pub use filter::{FilterDecision, FilterWalker, NodeFilter, Scope};
pub use input::{InputData, InputWalk, SignatureInput};
pub use node::{DocNode, DocumentId, NodeRef};
pub use nodeset::NodeSet;
pub use xpath::{here, SubsetEvaluator, XPathContext, XPathEvaluator};

/// Return roxmltree parsing options.
///
/// DTDs are accepted unless secure validation is requested, in which case
/// any document carrying a DTD is refused.  roxmltree never fetches
/// external subsets.
pub fn parsing_options(allow_dtd: bool) -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd,
        ..roxmltree::ParsingOptions::default()
    }
}
