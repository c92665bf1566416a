#![forbid(unsafe_code)]

/// Errors produced by the sigfilter transform pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("unsupported transform: {0}")]
    UnsupportedTransform(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("XPath error: {0}")]
    XPath(String),

    #[error("here() used across documents: {0}")]
    CrossDocument(String),

    #[error("secure validation violation: {0}")]
    SecurityPolicy(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error reports a missing or malformed part of the
    /// signature's own XML (as opposed to bad data or a policy refusal).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::XmlStructure(_) | Error::MissingElement(_) | Error::MissingAttribute(_)
        )
    }
}
