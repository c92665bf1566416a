#![forbid(unsafe_code)]

//! XML namespace constants used across the library.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XPath Filter 2.0 namespace
pub const XPATH2: &str = "http://www.w3.org/2002/06/xmldsig-filter2";

/// XSLT namespace
pub const XSLT: &str = "http://www.w3.org/1999/XSL/Transform";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";

    // XPath Filter 2.0 / Exc C14N
    pub const XPATH: &str = "XPath";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // XSLT
    pub const XSLT_STYLESHEET: &str = "stylesheet";
    pub const XSLT_TRANSFORM: &str = "transform";
    pub const XSLT_IMPORT: &str = "import";
    pub const XSLT_INCLUDE: &str = "include";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const ALGORITHM: &str = "Algorithm";
    pub const FILTER: &str = "Filter";
    pub const PREFIX_LIST: &str = "PrefixList";
}

// ── XPath2 filter values ─────────────────────────────────────────────

pub const XPATH2_FILTER_INTERSECT: &str = "intersect";
pub const XPATH2_FILTER_SUBTRACT: &str = "subtract";
pub const XPATH2_FILTER_UNION: &str = "union";
