#![forbid(unsafe_code)]

//! Character escaping for canonical output.
//!
//! Text nodes escape `&`, `<`, `>` and carriage returns.  Attribute values
//! additionally escape `"`, tabs and line feeds but leave `>` alone.
//! Processing-instruction data only escapes carriage returns.

use std::borrow::Cow;

/// Where a piece of character data is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Text,
    Attribute,
    ProcessingInstruction,
}

impl Context {
    fn replacement(self, ch: char) -> Option<&'static str> {
        match (self, ch) {
            (_, '\r') => Some("&#xD;"),
            (Context::ProcessingInstruction, _) => None,
            (_, '&') => Some("&amp;"),
            (_, '<') => Some("&lt;"),
            (Context::Text, '>') => Some("&gt;"),
            (Context::Attribute, '"') => Some("&quot;"),
            (Context::Attribute, '\t') => Some("&#x9;"),
            (Context::Attribute, '\n') => Some("&#xA;"),
            _ => None,
        }
    }
}

/// Escape `s` for the given context, borrowing when nothing changes.
pub fn escape(s: &str, context: Context) -> Cow<'_, str> {
    let Some(first) = s.find(|c| context.replacement(c).is_some()) else {
        return Cow::Borrowed(s);
    };
    let mut out = String::with_capacity(s.len() + 8);
    out.push_str(&s[..first]);
    for ch in s[first..].chars() {
        match context.replacement(ch) {
            Some(entity) => out.push_str(entity),
            None => out.push(ch),
        }
    }
    Cow::Owned(out)
}
