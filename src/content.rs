//! Message body decoding.
//!
//! The remote store hands out bodies in base64 with the URL-safe alphabet
//! (`-` and `_` in place of `+` and `/`). Decoding swaps those back and runs
//! standard base64.

use std::fmt;

use base64::{Engine as _, engine::general_purpose};

use crate::error::Result;
use crate::models::Part;

const PLAIN_TEXT: &str = "text/plain";

/// The displayable body of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    /// No plain-text part was found.
    Unknown,
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Unknown => None,
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(s) => f.write_str(s),
            Content::Unknown => f.write_str("<unknown content>"),
        }
    }
}

/// Undo the transport-safe substitution and base64-decode.
pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>> {
    let standard = encoded.trim().replace('-', "+").replace('_', "/");
    Ok(general_purpose::STANDARD.decode(standard)?)
}

/// [`decode_bytes`], then UTF-8 (lossily).
pub fn decode_body(encoded: &str) -> Result<String> {
    let bytes = decode_bytes(encoded)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Inverse of [`decode_bytes`].
pub fn encode_body(raw: &[u8]) -> String {
    general_purpose::STANDARD
        .encode(raw)
        .replace('+', "-")
        .replace('/', "_")
}

/// The part holding the displayable text: the payload itself when it has no
/// parts, otherwise the first `text/plain` part found depth-first.
pub fn text_part(payload: &Part) -> Option<&Part> {
    if payload.parts.is_empty() {
        return Some(payload);
    }
    find_plain(&payload.parts)
}

fn find_plain(parts: &[Part]) -> Option<&Part> {
    parts.iter().find_map(|part| {
        if part.mime_type == PLAIN_TEXT {
            Some(part)
        } else {
            find_plain(&part.parts)
        }
    })
}

/// Decoded bytes of the text part, exactly as sent. `None` if there is none.
pub fn body_bytes(payload: &Part) -> Result<Option<Vec<u8>>> {
    match text_part(payload) {
        Some(part) => decode_bytes(part.data.as_deref().unwrap_or_default()).map(Some),
        None => Ok(None),
    }
}

/// Pick the displayable text out of a message payload.
///
/// Nested multiparts (attachments around an alternative) are searched in
/// order; the first `text/plain` part wins.
pub fn get_body(payload: &Part) -> Result<Content> {
    Ok(match body_bytes(payload)? {
        Some(bytes) => Content::Text(String::from_utf8_lossy(&bytes).into_owned()),
        None => Content::Unknown,
    })
}
