#![forbid(unsafe_code)]

//! XML-DSig transform pipeline.
//!
//! Re-exports the member crates and adds the reference-level entry points:
//! dereference a `<ds:Reference>` URI, run its `<ds:Transforms>` chain and
//! hand back the octets a digest would be computed over.

pub use sigfilter_c14n as c14n;
pub use sigfilter_core as core;
pub use sigfilter_transforms as transforms;
pub use sigfilter_xml as xml;

pub use sigfilter_c14n::C14nMode;
pub use sigfilter_core::{Error, Result};
pub use sigfilter_transforms::{
    dereference, Transform, TransformAlgorithm, TransformContext, TransformPipeline,
    TransformRegistry,
};
pub use sigfilter_xml::{FilterDecision, NodeFilter, SignatureInput, XmlDocument};

use roxmltree::Node;
use sigfilter_core::ns;
use sigfilter_xml::document::find_child_element;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Dereference the URI of `reference` and build its transform chain.
///
/// A missing `URI` attribute selects the whole document.  A reference
/// without `<ds:Transforms>` gets an empty pipeline.
pub fn prepare_reference(
    document: &Arc<XmlDocument>,
    reference: Node<'_, '_>,
    registry: &TransformRegistry,
    ctx: &TransformContext,
) -> Result<(SignatureInput, TransformPipeline)> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");
    let input = dereference(uri, document, ctx.secure_validation())?;
    let pipeline = match find_child_element(reference, ns::DSIG, ns::node::TRANSFORMS) {
        Some(transforms) => TransformPipeline::from_element(document, transforms, registry, ctx)?,
        None => TransformPipeline::new(),
    };
    debug!(uri, transforms = pipeline.len(), "prepared reference");
    Ok((input, pipeline))
}

/// The octets of `reference` after all its transforms.
pub fn reference_octets(
    document: &Arc<XmlDocument>,
    reference: Node<'_, '_>,
    registry: &TransformRegistry,
    ctx: &TransformContext,
) -> Result<Vec<u8>> {
    let (input, pipeline) = prepare_reference(document, reference, registry, ctx)?;
    pipeline.execute_to_octets(input, ctx)
}

/// Stream the octets of `reference` after all its transforms into `sink`.
pub fn write_reference(
    document: &Arc<XmlDocument>,
    reference: Node<'_, '_>,
    registry: &TransformRegistry,
    ctx: &TransformContext,
    sink: &mut dyn Write,
) -> Result<()> {
    let (input, pipeline) = prepare_reference(document, reference, registry, ctx)?;
    pipeline.execute(input, ctx, Some(sink))?;
    Ok(())
}
