#![forbid(unsafe_code)]

//! Base64 decode transform.
//!
//! Octet input is decoded as-is; node input contributes only the
//! character data of its output text nodes, so a payload split across
//! lines or elements decodes as one.  Whitespace is ignored, anything
//! else outside the base64 alphabet is an error.

use crate::context::TransformContext;
use crate::pipeline::Transform;
use base64::Engine;
use sigfilter_core::{algorithm, Error};
use sigfilter_xml::SignatureInput;
use std::io::Write;

/// Encoded characters decoded per step; a multiple of 4.
const CHUNK: usize = 4 * 1024;

/// Base64 decode transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(
        &self,
        input: SignatureInput,
        _ctx: &TransformContext,
        sink: Option<&mut dyn Write>,
    ) -> Result<SignatureInput, Error> {
        let streaming = sink.is_some();
        let mut decoder = Decoder::new(sink);
        match input.octets() {
            Some(bytes) => decoder.push(bytes)?,
            None => input.visit_text(|text| decoder.push(text.as_bytes()))?,
        }
        let decoded = decoder.finish()?;

        let output = if streaming {
            SignatureInput::written()
        } else {
            SignatureInput::from_octets(decoded)
        };
        Ok(output.inherit_settings(&input))
    }
}

/// Incremental decoder over whitespace-separated base64 text.
struct Decoder<'w> {
    pending: Vec<u8>,
    sink: Option<&'w mut dyn Write>,
    decoded: Vec<u8>,
    padded: bool,
}

impl<'w> Decoder<'w> {
    fn new(sink: Option<&'w mut dyn Write>) -> Self {
        Self {
            pending: Vec::with_capacity(CHUNK),
            sink,
            decoded: Vec::new(),
            padded: false,
        }
    }

    fn push(&mut self, text: &[u8]) -> Result<(), Error> {
        for &b in text.iter().filter(|b| !b.is_ascii_whitespace()) {
            if self.padded {
                return Err(Error::Base64("data after padding".into()));
            }
            self.pending.push(b);
            if self.pending.len() == CHUNK {
                self.decode_pending()?;
            }
        }
        Ok(())
    }

    fn decode_pending(&mut self) -> Result<(), Error> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.pending)
            .map_err(|e| Error::Base64(format!("decode error: {e}")))?;
        self.padded = self.pending.ends_with(b"=");
        self.pending.clear();
        match self.sink.as_deref_mut() {
            Some(sink) => sink.write_all(&bytes)?,
            None => self.decoded.extend_from_slice(&bytes),
        }
        Ok(())
    }

    /// Decode the remainder; returns the buffered output (empty when
    /// streaming).
    fn finish(mut self) -> Result<Vec<u8>, Error> {
        if self.pending.len() % 4 != 0 {
            return Err(Error::Base64(format!(
                "truncated input ({} trailing characters)",
                self.pending.len() % 4
            )));
        }
        self.decode_pending()?;
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.flush()?;
        }
        Ok(self.decoded)
    }
}
