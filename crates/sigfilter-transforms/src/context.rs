#![forbid(unsafe_code)]

//! Per-verification settings handed to every transform.

use crate::xslt::XsltEngine;
use sigfilter_xml::{SignatureInput, SubsetEvaluator, XPathEvaluator};
use std::sync::Arc;

/// Settings shared by all transforms of one verification.
#[derive(Debug, Clone)]
pub struct TransformContext {
    secure_validation: bool,
    xpath: Arc<dyn XPathEvaluator>,
    xslt: Option<Arc<dyn XsltEngine>>,
}

impl TransformContext {
    pub fn new() -> Self {
        Self {
            secure_validation: false,
            xpath: Arc::new(SubsetEvaluator),
            xslt: None,
        }
    }

    /// Refuse DTDs, duplicate IDs, long transform chains and stylesheet
    /// imports.
    pub fn with_secure_validation(mut self, secure_validation: bool) -> Self {
        self.secure_validation = secure_validation;
        self
    }

    /// Replace the built-in XPath subset evaluator.
    pub fn with_xpath_evaluator(mut self, xpath: Arc<dyn XPathEvaluator>) -> Self {
        self.xpath = xpath;
        self
    }

    /// Provide the engine XSLT transforms run on.
    pub fn with_xslt_engine(mut self, xslt: Arc<dyn XsltEngine>) -> Self {
        self.xslt = Some(xslt);
        self
    }

    pub fn secure_validation(&self) -> bool {
        self.secure_validation
    }

    /// Whether secure validation applies to `input`, by either setting.
    pub fn is_secure(&self, input: &SignatureInput) -> bool {
        self.secure_validation || input.secure_validation()
    }

    pub fn xpath(&self) -> &dyn XPathEvaluator {
        self.xpath.as_ref()
    }

    pub fn xslt(&self) -> Option<&dyn XsltEngine> {
        self.xslt.as_deref()
    }
}

impl Default for TransformContext {
    fn default() -> Self {
        Self::new()
    }
}
