#![forbid(unsafe_code)]

//! XSLT transform.
//!
//! No XSLT processor is bundled.  Callers plug one in through
//! [`XsltEngine`] on the [`TransformContext`]; without an engine the
//! transform fails when executed.
//!
//! The stylesheet embedded in the signature is serialized on its own
//! (inclusive C14N with comments over its subtree) before it reaches the
//! engine, so every namespace it relies on is declared and nothing of the
//! enclosing document leaks in.

use crate::context::TransformContext;
use crate::pipeline::{emit_octets, Transform};
use roxmltree::Node;
use sigfilter_c14n::C14nMode;
use sigfilter_core::{algorithm, ns, Error};
use sigfilter_xml::document::{find_child_element, is_element_named};
use sigfilter_xml::{SignatureInput, XmlDocument};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::warn;

/// Line separator requested from the engine.
pub const LINE_SEPARATOR: &str = "\n";

/// Processor settings derived from the verification context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XsltOptions {
    /// Disable DTD loading and external stylesheet access.
    pub secure_validation: bool,
}

/// An XSLT processor.
pub trait XsltEngine: fmt::Debug + Send + Sync {
    /// Compile a standalone stylesheet document.
    fn compile(
        &self,
        stylesheet: &[u8],
        options: &XsltOptions,
    ) -> Result<Box<dyn CompiledStylesheet>, Error>;
}

/// A stylesheet ready to run.
pub trait CompiledStylesheet {
    /// Set the output line separator.  Engines that cannot do this return
    /// an error, which callers treat as non-fatal.
    fn set_line_separator(&mut self, separator: &str) -> Result<(), Error>;

    /// Transform `input` into `out`.
    fn apply(&self, input: &[u8], out: &mut dyn Write) -> Result<(), Error>;
}

/// The XSLT transform.
#[derive(Debug, Clone)]
pub struct XsltTransform {
    stylesheet: Vec<u8>,
    imports_external: bool,
}

impl XsltTransform {
    /// Bind to a `<ds:Transform>` element holding an `xsl:stylesheet` or,
    /// failing that, an `xsl:transform` child.
    pub fn from_element(
        document: &Arc<XmlDocument>,
        element: Node<'_, '_>,
        ctx: &TransformContext,
    ) -> Result<Self, Error> {
        let root = find_child_element(element, ns::XSLT, ns::node::XSLT_STYLESHEET)
            .or_else(|| find_child_element(element, ns::XSLT, ns::node::XSLT_TRANSFORM))
            .ok_or_else(|| {
                Error::MissingElement("XSLT transform without a stylesheet".into())
            })?;
        let imports_external = root.descendants().any(|n| {
            is_element_named(n, ns::XSLT, ns::node::XSLT_IMPORT)
                || is_element_named(n, ns::XSLT, ns::node::XSLT_INCLUDE)
        });
        if ctx.secure_validation() && imports_external {
            return Err(refused_import());
        }
        let stylesheet =
            sigfilter_c14n::canonicalize_subtree(document.clone(), root.id(), C14nMode::InclusiveWithComments)?;
        Ok(Self {
            stylesheet,
            imports_external,
        })
    }

    /// The isolated stylesheet document.
    pub fn stylesheet(&self) -> &[u8] {
        &self.stylesheet
    }
}

fn refused_import() -> Error {
    Error::SecurityPolicy("stylesheet imports or includes other stylesheets".into())
}

impl Transform for XsltTransform {
    fn uri(&self) -> &str {
        algorithm::XSLT
    }

    fn execute(
        &self,
        input: SignatureInput,
        ctx: &TransformContext,
        sink: Option<&mut dyn Write>,
    ) -> Result<SignatureInput, Error> {
        let secure_validation = ctx.is_secure(&input);
        if secure_validation && self.imports_external {
            return Err(refused_import());
        }
        let engine = ctx
            .xslt()
            .ok_or_else(|| Error::Transform("no XSLT engine configured".into()))?;
        let mut compiled = engine.compile(&self.stylesheet, &XsltOptions { secure_validation })?;
        if let Err(e) = compiled.set_line_separator(LINE_SEPARATOR) {
            warn!(error = %e, "XSLT engine cannot set the output line separator");
        }

        let source = sigfilter_c14n::octets(&input)?;
        match sink {
            Some(sink) => {
                compiled.apply(&source, sink)?;
                Ok(SignatureInput::written().inherit_settings(&input))
            }
            None => {
                let mut out = Vec::new();
                compiled.apply(&source, &mut out)?;
                emit_octets(out, None, &input)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records what it was given and echoes the input with a marker.
    #[derive(Debug, Default)]
    struct RecordingEngine {
        seen: Mutex<Vec<(Vec<u8>, XsltOptions)>>,
        fixed_lines: bool,
    }

    struct Echo {
        fixed_lines: bool,
    }

    impl XsltEngine for RecordingEngine {
        fn compile(
            &self,
            stylesheet: &[u8],
            options: &XsltOptions,
        ) -> Result<Box<dyn CompiledStylesheet>, Error> {
            self.seen
                .lock()
                .unwrap()
                .push((stylesheet.to_vec(), options.clone()));
            Ok(Box::new(Echo {
                fixed_lines: self.fixed_lines,
            }))
        }
    }

    impl CompiledStylesheet for Echo {
        fn set_line_separator(&mut self, _separator: &str) -> Result<(), Error> {
            if self.fixed_lines {
                Err(Error::Transform("unsupported".into()))
            } else {
                Ok(())
            }
        }

        fn apply(&self, input: &[u8], out: &mut dyn Write) -> Result<(), Error> {
            out.write_all(b"out:")?;
            out.write_all(input)?;
            Ok(())
        }
    }

    const SIGNED: &str = r#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><ds:Transform Algorithm="http://www.w3.org/TR/1999/REC-xslt-19991116">BODY</ds:Transform></doc>"#;

    fn bind(body: &str, ctx: &TransformContext) -> Result<XsltTransform, Error> {
        let xml = Arc::new(XmlDocument::parse(SIGNED.replace("BODY", body)).unwrap());
        let doc = xml.parse_doc().unwrap();
        let element = doc
            .descendants()
            .find(|n| n.has_tag_name((ns::DSIG, ns::node::TRANSFORM)))
            .unwrap();
        XsltTransform::from_element(&xml, element, ctx)
    }

    #[test]
    fn test_stylesheet_is_isolated() {
        let t = bind(
            r#"<xsl:stylesheet version="1.0"><!--keep--><xsl:template match="/"/></xsl:stylesheet>"#,
            &TransformContext::default(),
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(t.stylesheet().to_vec()).unwrap(),
            concat!(
                r#"<xsl:stylesheet xmlns:ds="http://www.w3.org/2000/09/xmldsig#" "#,
                r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0">"#,
                r#"<!--keep--><xsl:template match="/"></xsl:template></xsl:stylesheet>"#
            )
        );
    }

    #[test]
    fn test_stylesheet_preferred_over_transform_root() {
        let t = bind(
            r#"<xsl:transform version="1.0"/><xsl:stylesheet version="2.0"/>"#,
            &TransformContext::default(),
        )
        .unwrap();
        assert!(String::from_utf8_lossy(t.stylesheet()).starts_with("<xsl:stylesheet"));

        let t = bind(r#"<xsl:transform version="1.0"/>"#, &TransformContext::default()).unwrap();
        assert!(String::from_utf8_lossy(t.stylesheet()).starts_with("<xsl:transform"));
    }

    #[test]
    fn test_missing_stylesheet() {
        let err = bind("<other/>", &TransformContext::default()).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_imports_refused_under_secure_validation() {
        let body = r#"<xsl:stylesheet version="1.0"><xsl:import href="http://example.com/x.xsl"/></xsl:stylesheet>"#;
        assert!(bind(body, &TransformContext::default()).is_ok());
        let secure = TransformContext::default().with_secure_validation(true);
        assert!(matches!(bind(body, &secure), Err(Error::SecurityPolicy(_))));
    }

    #[test]
    fn test_execute_without_engine_fails() {
        let t = bind(r#"<xsl:stylesheet version="1.0"/>"#, &TransformContext::default()).unwrap();
        let input = SignatureInput::from_octets(b"<a/>".to_vec());
        let err = t.execute(input, &TransformContext::default(), None).unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }

    #[test]
    fn test_execute_runs_engine_on_octets() {
        let engine = Arc::new(RecordingEngine {
            fixed_lines: true,
            ..RecordingEngine::default()
        });
        let ctx = TransformContext::default()
            .with_secure_validation(true)
            .with_xslt_engine(engine.clone());
        let t = bind(r#"<xsl:stylesheet version="1.0"/>"#, &ctx).unwrap();

        let xml = Arc::new(XmlDocument::parse("<a  b='1'/>".to_owned()).unwrap());
        let doc = xml.parse_doc().unwrap();
        let input = SignatureInput::from_node(xml.clone(), doc.root());
        let output = t.execute(input, &ctx, None).unwrap();
        assert_eq!(output.octets().unwrap(), br#"out:<a b="1"></a>"#);

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, t.stylesheet());
        assert!(seen[0].1.secure_validation);
    }
}
