#![forbid(unsafe_code)]

//! Shared building blocks for the sigfilter XML-DSig transform pipeline:
//! the error type, algorithm URIs and namespace constants.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
