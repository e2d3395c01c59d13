//! Object key decoding shared by every dialect

use crate::error::{ImageHandlerError, Result};

/// Percent-decode a raw path fragment into an object key
///
/// `+` is left as-is (it is a literal character in object keys), and escapes
/// that do not form valid UTF-8 are rejected rather than replaced.
pub fn decode_key(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| {
            tracing::debug!(error = %e, raw, "Percent-decoding produced invalid UTF-8");
            ImageHandlerError::CannotDecodeRequest
        })
}
