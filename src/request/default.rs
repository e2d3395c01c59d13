//! Default dialect decoding
//!
//! Two forms share this dialect:
//!
//! - an S3-style path (`/bucket/key`, `/key`, or a full S3 URL) with
//!   optional `edits` and `headers` JSON query parameters
//! - a base64 JSON envelope (`{"bucket", "key", "edits", "headers",
//!   "outputFormat"}`) as the whole path, which is authoritative for every
//!   field it carries

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde_json::Value;

use super::key::decode_key;
use super::s3_url::S3Location;
use super::types::{DecodedRequest, EditsMap, ImageHandlerEvent, OutputFormat};
use crate::error::{ImageHandlerError, Result};

const LENIENT_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_PADDING);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_PADDING);

/// Decode a Default-dialect request
pub fn decode_default(path: &str, event: &ImageHandlerEvent) -> Result<DecodedRequest> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(ImageHandlerError::CannotFindImage);
    }

    if let Some(envelope) = decode_envelope(trimmed) {
        return decode_envelope_fields(envelope);
    }

    let decoded = decode_key(trimmed)?;
    let location = S3Location::parse(&decoded).ok_or(ImageHandlerError::CannotDecodeRequest)?;
    if location.key.is_empty() {
        return Err(ImageHandlerError::CannotFindImage);
    }

    Ok(DecodedRequest {
        bucket: location.bucket,
        key: location.key,
        bucket_tags: Vec::new(),
        edits: json_object_param(event.query("edits"), "edits")?.unwrap_or_default(),
        headers: json_object_param(event.query("headers"), "headers")?,
        output_format: None,
    })
}

/// Base64 text that decodes to a JSON object
///
/// Anything else (plain keys, S3 paths, base64 of non-objects) is not an
/// envelope and falls through to path decoding.
fn decode_envelope(candidate: &str) -> Option<serde_json::Map<String, Value>> {
    let looks_base64 = candidate.len() >= 4
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'-' | b'_'));
    if !looks_base64 {
        return None;
    }

    let bytes = STANDARD_LENIENT
        .decode(candidate)
        .or_else(|_| URL_SAFE_LENIENT.decode(candidate))
        .ok()?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn decode_envelope_fields(mut envelope: serde_json::Map<String, Value>) -> Result<DecodedRequest> {
    let key = match envelope.remove("key") {
        Some(Value::String(key)) if !key.is_empty() => decode_key(&key)?,
        _ => return Err(ImageHandlerError::CannotFindImage),
    };

    let bucket = match envelope.remove("bucket") {
        Some(Value::String(bucket)) if !bucket.is_empty() => Some(bucket),
        _ => None,
    };

    let edits = object_field(envelope.remove("edits"), "edits")?.unwrap_or_default();
    let headers = object_field(envelope.remove("headers"), "headers")?;

    let output_format = match envelope.remove("outputFormat") {
        Some(Value::String(raw)) => parse_output_format(&raw),
        _ => None,
    };

    Ok(DecodedRequest {
        bucket,
        key,
        bucket_tags: Vec::new(),
        edits,
        headers,
        output_format,
    })
}

/// Parse a JSON query parameter that must hold an object
pub(crate) fn json_object_param(raw: Option<&str>, param: &str) -> Result<Option<EditsMap>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        tracing::debug!(param, error = %e, "Query parameter is not valid JSON");
        ImageHandlerError::malformed_json(param)
    })?;
    object_field(Some(value), param)
}

fn object_field(value: Option<Value>, param: &str) -> Result<Option<EditsMap>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(ImageHandlerError::malformed_json(param)),
    }
}

/// Unknown formats are ignored rather than failing the request
pub(crate) fn parse_output_format(raw: &str) -> Option<OutputFormat> {
    match raw.parse::<OutputFormat>() {
        Ok(format) => Some(format),
        Err(_) => {
            tracing::warn!(output_format = raw, "Ignoring unrecognized output format");
            None
        }
    }
}
