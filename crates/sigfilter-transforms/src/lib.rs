#![forbid(unsafe_code)]

//! Transform pipeline for XML signature references.
//!
//! Implements the transform chain model from XML-DSig: each reference
//! contains a sequence of transforms applied in order to a
//! [`SignatureInput`](sigfilter_xml::SignatureInput).  Transforms are
//! resolved and bound to their parameters when the pipeline is built and
//! run against a [`TransformContext`].

pub mod base64_transform;
pub mod c14n_transform;
pub mod context;
pub mod enveloped;
pub mod pipeline;
pub mod registry;
pub mod uri;
pub mod xpath2;
pub mod xslt;

pub use base64_transform::Base64DecodeTransform;
pub use c14n_transform::C14nTransform;
pub use context::TransformContext;
pub use enveloped::{EnvelopedNodeFilter, EnvelopedSignatureTransform};
pub use pipeline::{Transform, TransformPipeline, MAX_TRANSFORMS_SECURE};
pub use registry::{TransformAlgorithm, TransformRegistry};
pub use uri::dereference;
pub use xpath2::{FilterOp, XPath2FilterTransform, XPath2NodeFilter};
pub use xslt::{CompiledStylesheet, XsltEngine, XsltOptions, XsltTransform};
