use base64::Engine;
use proptest::prelude::*;
use sigfilter::core::{algorithm, ns};
use sigfilter::transforms::{CompiledStylesheet, XsltEngine, XsltOptions};
use sigfilter::{
    reference_octets, write_reference, C14nMode, Error, TransformAlgorithm, TransformContext,
    TransformRegistry, XmlDocument,
};
use std::io::Write;
use std::sync::Arc;

fn transform(uri: &str) -> String {
    format!(r#"<ds:Transform Algorithm="{uri}"/>"#)
}

/// A document whose only `<ds:Reference>` points at `uri` through
/// `transforms`; `body` precedes the signature.
fn signed(body: &str, uri: &str, transforms: &str) -> String {
    format!(
        concat!(
            r#"<a>{body}<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#,
            r#"<ds:SignedInfo><ds:Reference URI="{uri}"><ds:Transforms>{transforms}</ds:Transforms>"#,
            r#"</ds:Reference></ds:SignedInfo></ds:Signature></a>"#
        ),
        body = body,
        uri = uri,
        transforms = transforms,
    )
}

fn process_with(
    xml: &str,
    registry: &TransformRegistry,
    ctx: &TransformContext,
) -> Result<Vec<u8>, Error> {
    let document = Arc::new(XmlDocument::parse_with(xml.to_owned(), ctx.secure_validation())?);
    let doc = document.parse_doc()?;
    let reference = doc
        .descendants()
        .find(|n| n.has_tag_name((ns::DSIG, ns::node::REFERENCE)))
        .expect("document has a reference");
    reference_octets(&document, reference, registry, ctx)
}

fn process(xml: &str, ctx: &TransformContext) -> Result<String, Error> {
    let bytes = process_with(xml, &TransformRegistry::with_defaults(), ctx)?;
    Ok(String::from_utf8(bytes).unwrap())
}

#[test]
fn enveloped_signature_is_left_out() {
    let transforms = transform(algorithm::ENVELOPED_SIGNATURE) + &transform(algorithm::C14N);
    let xml = signed("<!--note--><b>data</b>", "", &transforms);
    assert_eq!(
        process(&xml, &TransformContext::default()).unwrap(),
        "<a><b>data</b></a>"
    );
}

#[test]
fn whole_document_reference_drops_comments_even_with_comments_c14n() {
    let transforms =
        transform(algorithm::ENVELOPED_SIGNATURE) + &transform(algorithm::C14N_WITH_COMMENTS);
    let xml = signed("<!--note--><b>data</b>", "", &transforms);
    assert_eq!(
        process(&xml, &TransformContext::default()).unwrap(),
        "<a><b>data</b></a>"
    );

    let xml = signed("<!--note--><b>data</b>", "#xpointer(/)", &transforms);
    assert_eq!(
        process(&xml, &TransformContext::default()).unwrap(),
        "<a><!--note--><b>data</b></a>"
    );
}

#[test]
fn reference_without_transforms_gives_canonical_element() {
    let xml = concat!(
        r#"<a><p Id="p" z="1"  y='2'>text</p>"#,
        r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo>"#,
        r##"<ds:Reference URI="#p"/></ds:SignedInfo></ds:Signature></a>"##
    );
    assert_eq!(
        process(xml, &TransformContext::default()).unwrap(),
        r#"<p Id="p" y="2" z="1">text</p>"#
    );
}

#[test]
fn base64_payload_split_across_elements() {
    let body = "<payload Id=\"p\">SGVs<i>bG8g</i>V29y\n  bGQ=</payload>";
    let xml = signed(body, "#p", &transform(algorithm::BASE64));
    assert_eq!(process(&xml, &TransformContext::default()).unwrap(), "Hello World");
}

#[test]
fn xpath_filter_subtracts_enclosing_signature_with_here() {
    let filter = concat!(
        r#"<ds:Transform Algorithm="http://www.w3.org/2002/06/xmldsig-filter2">"#,
        r#"<f:XPath xmlns:f="http://www.w3.org/2002/06/xmldsig-filter2" Filter="subtract">"#,
        r#"here()/ancestor::ds:Signature[1]</f:XPath></ds:Transform>"#
    );
    let xml = signed("<b>data</b>", "", filter);
    assert_eq!(
        process(&xml, &TransformContext::default()).unwrap(),
        "<a><b>data</b></a>"
    );
}

#[test]
fn enveloped_and_xpath_filters_combine() {
    let filter = concat!(
        r#"<ds:Transform Algorithm="http://www.w3.org/2002/06/xmldsig-filter2">"#,
        r#"<f:XPath xmlns:f="http://www.w3.org/2002/06/xmldsig-filter2" Filter="intersect">"#,
        r#"//b | //ds:Signature</f:XPath></ds:Transform>"#
    );
    let transforms = transform(algorithm::ENVELOPED_SIGNATURE) + filter;
    let xml = signed("<b>data</b><c/>", "", &transforms);
    assert_eq!(
        process(&xml, &TransformContext::default()).unwrap(),
        "<b>data</b>"
    );
}

#[test]
fn exclusive_c14n_honours_inclusive_namespaces() {
    let c14n = concat!(
        r#"<ds:Transform Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#">"#,
        r#"<ec:InclusiveNamespaces xmlns:ec="http://www.w3.org/2001/10/xml-exc-c14n#" PrefixList="u"/>"#,
        r#"</ds:Transform>"#
    );
    let body = r#"<p Id="p" xmlns:u="urn:u" xmlns:v="urn:v"><q/></p>"#;
    let xml = signed(body, "#p", c14n);
    assert_eq!(
        process(&xml, &TransformContext::default()).unwrap(),
        r#"<p xmlns:u="urn:u" Id="p"><q></q></p>"#
    );
}

#[test]
fn streaming_matches_buffered_output() {
    let transforms = transform(algorithm::ENVELOPED_SIGNATURE) + &transform(algorithm::EXC_C14N);
    let xml = signed("<b x='1'>data</b>", "", &transforms);
    let document = Arc::new(XmlDocument::parse(xml).unwrap());
    let doc = document.parse_doc().unwrap();
    let reference = doc
        .descendants()
        .find(|n| n.has_tag_name((ns::DSIG, ns::node::REFERENCE)))
        .unwrap();
    let registry = TransformRegistry::with_defaults();
    let ctx = TransformContext::default();

    let mut streamed = Vec::new();
    write_reference(&document, reference, &registry, &ctx, &mut streamed).unwrap();
    let buffered = reference_octets(&document, reference, &registry, &ctx).unwrap();
    assert_eq!(streamed, buffered);
    assert_eq!(streamed, br#"<a><b x="1">data</b></a>"#);
}

#[test]
fn registered_alias_resolves() {
    let mut registry = TransformRegistry::with_defaults();
    registry.register(
        "urn:example:exc-c14n",
        TransformAlgorithm::Canonical(C14nMode::Exclusive),
    );
    let transforms =
        transform(algorithm::ENVELOPED_SIGNATURE) + &transform("urn:example:exc-c14n");
    let xml = signed("<b>data</b>", "", &transforms);
    let bytes = process_with(&xml, &registry, &TransformContext::default()).unwrap();
    assert_eq!(bytes, b"<a><b>data</b></a>");
}

#[test]
fn unknown_transform_fails_before_execution() {
    let xml = signed("<b>data</b>", "", &transform("urn:example:unknown"));
    assert!(matches!(
        process(&xml, &TransformContext::default()),
        Err(Error::UnsupportedTransform(uri)) if uri == "urn:example:unknown"
    ));
}

#[test]
fn external_reference_is_refused() {
    let xml = signed("<b>data</b>", "http://example.com/data.xml", "");
    assert!(matches!(
        process(&xml, &TransformContext::default()),
        Err(Error::InvalidUri(_))
    ));
}

#[test]
fn secure_validation_refuses_duplicate_ids() {
    let body = r#"<p Id="x">1</p><q Id="x">2</q>"#;
    let xml = signed(body, "#x", &transform(algorithm::C14N));
    assert_eq!(
        process(&xml, &TransformContext::default()).unwrap(),
        r#"<p Id="x">1</p>"#
    );
    let secure = TransformContext::default().with_secure_validation(true);
    assert!(matches!(process(&xml, &secure), Err(Error::SecurityPolicy(_))));
}

#[test]
fn secure_validation_limits_transform_count() {
    let transforms = transform(algorithm::C14N).repeat(6);
    let xml = signed("<b>data</b>", "", &transforms);
    assert!(process(&xml, &TransformContext::default()).is_ok());
    let secure = TransformContext::default().with_secure_validation(true);
    assert!(matches!(process(&xml, &secure), Err(Error::SecurityPolicy(_))));
}

#[test]
fn secure_validation_refuses_dtd() {
    let xml = r#"<!DOCTYPE a [<!ENTITY e "x">]><a/>"#;
    assert!(XmlDocument::parse_with(xml.to_owned(), false).is_ok());
    assert!(matches!(
        XmlDocument::parse_with(xml.to_owned(), true),
        Err(Error::SecurityPolicy(_))
    ));
}

#[test]
fn secure_validation_refuses_stylesheet_imports() {
    let xslt = format!(
        concat!(
            r#"<ds:Transform Algorithm="{}">"#,
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0">"#,
            r#"<xsl:import href="other.xsl"/></xsl:stylesheet></ds:Transform>"#
        ),
        algorithm::XSLT
    );
    let xml = signed("<b>data</b>", "", &xslt);
    let secure = TransformContext::default().with_secure_validation(true);
    assert!(matches!(process(&xml, &secure), Err(Error::SecurityPolicy(_))));
}

/// Upper-cases whatever it is given.
#[derive(Debug)]
struct UpperCaseEngine;

struct UpperCase;

impl XsltEngine for UpperCaseEngine {
    fn compile(
        &self,
        _stylesheet: &[u8],
        _options: &XsltOptions,
    ) -> Result<Box<dyn CompiledStylesheet>, Error> {
        Ok(Box::new(UpperCase))
    }
}

impl CompiledStylesheet for UpperCase {
    fn set_line_separator(&mut self, _separator: &str) -> Result<(), Error> {
        Ok(())
    }

    fn apply(&self, input: &[u8], out: &mut dyn Write) -> Result<(), Error> {
        out.write_all(&input.to_ascii_uppercase())?;
        Ok(())
    }
}

#[test]
fn xslt_runs_through_the_configured_engine() {
    let xslt = format!(
        concat!(
            r#"<ds:Transform Algorithm="{}">"#,
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0"/>"#,
            r#"</ds:Transform>"#
        ),
        algorithm::XSLT
    );
    let transforms = transform(algorithm::ENVELOPED_SIGNATURE) + &xslt;
    let xml = signed("<b>data</b>", "", &transforms);

    assert!(matches!(
        process(&xml, &TransformContext::default()),
        Err(Error::Transform(_))
    ));
    let ctx = TransformContext::default().with_xslt_engine(Arc::new(UpperCaseEngine));
    assert_eq!(process(&xml, &ctx).unwrap(), "<A><B>DATA</B></A>");
}

proptest! {
    #[test]
    fn base64_round_trips_through_element_content(
        payload in proptest::collection::vec(any::<u8>(), 0..256),
        width in 1usize..40,
    ) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&payload);
        let chunks: String = encoded
            .as_bytes()
            .chunks(width)
            .map(|c| format!("<c>{}</c>\n", std::str::from_utf8(c).unwrap()))
            .collect();
        let body = format!(r#"<payload Id="p">{chunks}</payload>"#);
        let xml = signed(&body, "#p", &transform(algorithm::BASE64));
        let decoded = process_with(
            &xml,
            &TransformRegistry::with_defaults(),
            &TransformContext::default(),
        )
        .unwrap();
        prop_assert_eq!(decoded, payload);
    }
}
