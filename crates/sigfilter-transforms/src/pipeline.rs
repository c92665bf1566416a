#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use crate::context::TransformContext;
use crate::registry::TransformRegistry;
use roxmltree::Node;
use sigfilter_core::{ns, Error};
use sigfilter_xml::document::find_child_elements;
use sigfilter_xml::{SignatureInput, XmlDocument};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Longest transform chain accepted under secure validation.
pub const MAX_TRANSFORMS_SECURE: usize = 5;

/// A transform bound to its parameters.
pub trait Transform: fmt::Debug + Send + Sync {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform.
    ///
    /// With a `sink`, octet output is streamed into it and the result
    /// reports [`SignatureInput::is_written`].  Transforms that only
    /// attach filters leave the sink untouched.
    fn execute(
        &self,
        input: SignatureInput,
        ctx: &TransformContext,
        sink: Option<&mut dyn Write>,
    ) -> Result<SignatureInput, Error>;
}

/// Octets produced by a transform: streamed into `sink` or carried in
/// the result.
pub(crate) fn emit_octets(
    bytes: Vec<u8>,
    sink: Option<&mut dyn Write>,
    from: &SignatureInput,
) -> Result<SignatureInput, Error> {
    let output = match sink {
        Some(sink) => {
            sink.write_all(&bytes)?;
            SignatureInput::written()
        }
        None => SignatureInput::from_octets(bytes),
    };
    Ok(output.inherit_settings(from))
}

/// A pipeline of transforms executed in sequence.
#[derive(Debug, Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    /// Build a pipeline from a `<ds:Transforms>` element of `document`.
    ///
    /// Every transform is resolved and bound here, so unknown algorithms
    /// and malformed parameters fail before any data is processed.
    pub fn from_element(
        document: &Arc<XmlDocument>,
        transforms: Node<'_, '_>,
        registry: &TransformRegistry,
        ctx: &TransformContext,
    ) -> Result<Self, Error> {
        let elements = find_child_elements(transforms, ns::DSIG, ns::node::TRANSFORM);
        if ctx.secure_validation() && elements.len() > MAX_TRANSFORMS_SECURE {
            return Err(Error::SecurityPolicy(format!(
                "{} transforms exceed the limit of {MAX_TRANSFORMS_SECURE}",
                elements.len()
            )));
        }

        let mut pipeline = Self::new();
        for element in elements {
            let uri = element.attribute(ns::attr::ALGORITHM).ok_or_else(|| {
                Error::MissingAttribute(format!(
                    "{} on <{}>",
                    ns::attr::ALGORITHM,
                    ns::node::TRANSFORM
                ))
            })?;
            let algorithm = registry.lookup(uri)?;
            pipeline.push(algorithm.bind(document, element, ctx)?);
        }
        debug!(transforms = ?pipeline.uris(), "built transform pipeline");
        Ok(pipeline)
    }

    /// Add a transform to the pipeline.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    ///
    /// Only the last transform gets the sink.  If a sink is given and the
    /// chain ends on nodes, their canonical octets are written to it.
    pub fn execute(
        &self,
        input: SignatureInput,
        ctx: &TransformContext,
        mut sink: Option<&mut dyn Write>,
    ) -> Result<SignatureInput, Error> {
        let secure = ctx.is_secure(&input);
        let mut data = input.with_secure_validation(secure);
        let last = self.transforms.len().saturating_sub(1);
        for (i, transform) in self.transforms.iter().enumerate() {
            debug!(
                algorithm = transform.uri(),
                input = data.representation(),
                "executing transform"
            );
            let out = match sink.as_mut() {
                Some(sink) if i == last => Some(&mut **sink as &mut dyn Write),
                _ => None,
            };
            data = transform.execute(data, ctx, out)?;
        }

        match sink {
            Some(sink) if !data.is_written() => {
                let bytes = sigfilter_c14n::octets(&data)?;
                emit_octets(bytes, Some(sink), &data)
            }
            _ => Ok(data),
        }
    }

    /// Execute all transforms and return the resulting octets.
    pub fn execute_to_octets(
        &self,
        input: SignatureInput,
        ctx: &TransformContext,
    ) -> Result<Vec<u8>, Error> {
        let output = self.execute(input, ctx, None)?;
        sigfilter_c14n::octets(&output)
    }

    /// Algorithm URIs in execution order.
    pub fn uris(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.uri()).collect()
    }

    /// Number of transforms in the pipeline.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}
