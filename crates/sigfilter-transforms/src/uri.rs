#![forbid(unsafe_code)]

//! Same-document URI dereferencing for `<ds:Reference URI="...">`.
//!
//! Handles:
//! - `""`: the whole document, without comments
//! - `#id`: the element with that ID, without comments
//! - `#xpointer(/)` and `#xpointer(id('id'))`: the same selections with
//!   comments
//!
//! Anything else, including external resources, is refused.

use sigfilter_core::Error;
use sigfilter_xml::{SignatureInput, XmlDocument};
use std::sync::Arc;

/// What a same-document reference selects.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target<'a> {
    Document,
    Id(&'a str),
}

fn parse(uri: &str) -> Result<(Target<'_>, bool), Error> {
    if uri.is_empty() {
        return Ok((Target::Document, false));
    }
    let fragment = uri
        .strip_prefix('#')
        .ok_or_else(|| Error::InvalidUri(format!("external URI not supported: {uri}")))?;
    let Some(pointer) = fragment
        .strip_prefix("xpointer(")
        .and_then(|p| p.strip_suffix(')'))
    else {
        if fragment.is_empty() {
            return Err(Error::InvalidUri("empty fragment".into()));
        }
        return Ok((Target::Id(fragment), false));
    };
    if pointer == "/" {
        return Ok((Target::Document, true));
    }
    let id = pointer
        .strip_prefix("id(")
        .and_then(|p| p.strip_suffix(')'))
        .and_then(|p| {
            p.strip_prefix('\'')
                .and_then(|q| q.strip_suffix('\''))
                .or_else(|| p.strip_prefix('"').and_then(|q| q.strip_suffix('"')))
        })
        .ok_or_else(|| Error::InvalidUri(format!("unsupported XPointer: {uri}")))?;
    Ok((Target::Id(id), true))
}

/// Dereference a same-document `uri` against `document`.
pub fn dereference(
    uri: &str,
    document: &Arc<XmlDocument>,
    secure_validation: bool,
) -> Result<SignatureInput, Error> {
    let (target, with_comments) = parse(uri)?;
    let doc = document.parse_doc()?;
    let node = match target {
        Target::Document => doc.root(),
        Target::Id(id) => {
            let ids = document.build_id_map(&doc, secure_validation)?;
            let node_id = ids
                .get(id)
                .copied()
                .ok_or_else(|| Error::InvalidUri(format!("no element with ID '{id}'")))?;
            doc.get_node(node_id)
                .ok_or_else(|| Error::InvalidUri(format!("no element with ID '{id}'")))?
        }
    };
    Ok(SignatureInput::from_node(document.clone(), node)
        .with_source_uri(uri)
        .with_secure_validation(secure_validation)
        .with_exclude_comments(!with_comments))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Arc<XmlDocument> {
        Arc::new(
            XmlDocument::parse(r#"<r><!--top--><e Id="x"><!--in-->t</e><f Id="x"/></r>"#.to_owned())
                .unwrap(),
        )
    }

    fn octets(uri: &str) -> Result<String, Error> {
        let input = dereference(uri, &doc(), false)?;
        let bytes =
            sigfilter_c14n::canonicalize_to_vec(&input, sigfilter_c14n::C14nMode::InclusiveWithComments, &[])?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn test_whole_document_without_comments() {
        assert_eq!(octets("").unwrap(), r#"<r><e Id="x">t</e><f Id="x"></f></r>"#);
    }

    #[test]
    fn test_xpointer_root_keeps_comments() {
        assert_eq!(
            octets("#xpointer(/)").unwrap(),
            r#"<r><!--top--><e Id="x"><!--in-->t</e><f Id="x"></f></r>"#
        );
    }

    #[test]
    fn test_id_reference() {
        assert_eq!(octets("#x").unwrap(), r#"<e Id="x">t</e>"#);
        assert_eq!(octets("#xpointer(id('x'))").unwrap(), r#"<e Id="x"><!--in-->t</e>"#);
        assert_eq!(octets("#xpointer(id(\"x\"))").unwrap(), r#"<e Id="x"><!--in-->t</e>"#);
        let input = dereference("#x", &doc(), false).unwrap();
        assert_eq!(input.source_uri(), Some("#x"));
    }

    #[test]
    fn test_duplicate_ids_refused_when_secure() {
        assert!(matches!(
            dereference("#x", &doc(), true),
            Err(Error::SecurityPolicy(_))
        ));
    }

    #[test]
    fn test_unsupported_references() {
        for uri in ["http://example.com/doc.xml", "#missing", "#", "#xpointer(//e)"] {
            assert!(matches!(octets(uri), Err(Error::InvalidUri(_))), "{uri}");
        }
    }
}
