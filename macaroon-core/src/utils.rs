use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

use crate::error::MacaroonError;

/// Encodes binary macaroon data as URL-safe base64 without padding.
pub fn encode_token(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes base64 macaroon data.
///
/// Accepts the standard and URL-safe alphabets, padded or not.
pub fn decode_token(token: &str) -> Result<Vec<u8>, MacaroonError> {
    let token = token.trim();
    let url_safe = token.contains(['-', '_']);
    let padded = token.ends_with('=');
    let engine = match (url_safe, padded) {
        (true, true) => &URL_SAFE,
        (true, false) => &URL_SAFE_NO_PAD,
        (false, true) => &STANDARD,
        (false, false) => &STANDARD_NO_PAD,
    };
    Ok(engine.decode(token)?)
}
