//! Opaque transport encoding for sanitized block content.
//!
//! The payload is standard base64 (with padding). It never needs more than ordinary
//! attribute quoting, round-trips arbitrary UTF-8 byte-exactly, and an HTML parser that only
//! ever sees the encoded form cannot interpret it as markup.

use crate::sanitize::SanitizedPayload;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload contains a byte outside the base64 alphabet at offset {offset}")]
    InvalidCharacter { offset: usize },
    #[error("payload length {len} is not a multiple of 4")]
    InvalidLength { len: usize },
    #[error("payload padding is malformed")]
    InvalidPadding,
    #[error("payload failed to decode: {message}")]
    Decode { message: String },
    #[error("decoded payload is not valid UTF-8")]
    InvalidUtf8,
}

fn is_alphabet_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

/// Checks the shape of a payload without decoding it.
///
/// Accepts only the standard alphabet, a length that is a multiple of four, and at most two
/// trailing `=` characters. Anything else is rejected here rather than left to the decoder, so
/// strings that a lenient decoder would accept still fail. The empty string is the encoding of
/// empty content; callers that need content must reject it themselves.
pub fn check_structure(payload: &str) -> Result<(), PayloadError> {
    let bytes = payload.as_bytes();
    if bytes.is_empty() {
        return Ok(());
    }
    if bytes.len() % 4 != 0 {
        return Err(PayloadError::InvalidLength { len: bytes.len() });
    }

    let data_end = bytes
        .iter()
        .rposition(|&b| b != b'=')
        .map(|i| i + 1)
        .unwrap_or(0);
    let padding = bytes.len() - data_end;
    if padding > 2 || data_end == 0 {
        return Err(PayloadError::InvalidPadding);
    }

    if let Some(offset) = bytes[..data_end].iter().position(|&b| !is_alphabet_byte(b)) {
        if bytes[offset] == b'=' {
            return Err(PayloadError::InvalidPadding);
        }
        return Err(PayloadError::InvalidCharacter { offset });
    }

    Ok(())
}

/// Encodes sanitized HTML for embedding in a `data-*` attribute.
///
/// Only a [`SanitizedPayload`] can be encoded; raw author HTML has no path into this function.
pub fn encode(payload: &SanitizedPayload) -> String {
    encode_str(payload.as_str())
}

pub(crate) fn encode_str(html: &str) -> String {
    STANDARD.encode(html.as_bytes())
}

/// Decodes a payload produced by [`encode`].
pub fn decode(payload: &str) -> Result<String, PayloadError> {
    check_structure(payload)?;
    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|err| PayloadError::Decode {
            message: err.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| PayloadError::InvalidUtf8)
}
