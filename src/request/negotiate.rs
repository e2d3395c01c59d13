//! Output negotiation
//!
//! Chooses the output format, response content type and cache directives
//! once the source object's metadata is known.
//!
//! Output format precedence, highest first:
//! 1. `outputFormat` query parameter
//! 2. format named by the request itself (envelope field, `format()` filter)
//! 3. `toFormat` edit
//! 4. WebP, when enabled and the client's Accept header allows it
//! 5. the SVG raster fallback, when an SVG source is being edited

use serde_json::Value;

use super::types::{EditsMap, ImageHandlerEvent, ImageRequestInfo, OutputFormat, ResolvedRequest};
use crate::config::OutputConfig;
use crate::constants::{
    DEFAULT_CONTENT_TYPE, MAX_REDUCTION_EFFORT, MIN_REDUCTION_EFFORT, SVG_CONTENT_TYPE,
};
use crate::store::StoredObject;

/// Request-side inputs that only matter for negotiation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHints {
    pub accept: Option<String>,
    pub reduction_effort: Option<String>,
}

impl ClientHints {
    pub fn from_event(event: &ImageHandlerEvent) -> Self {
        Self {
            accept: event.header("accept").map(str::to_string),
            reduction_effort: event.query("reductionEffort").map(str::to_string),
        }
    }

    fn accepts_webp(&self) -> bool {
        self.accept.as_deref().is_some_and(|accept| {
            accept.split(',').any(|range| {
                range
                    .split(';')
                    .next()
                    .is_some_and(|media| media.trim().eq_ignore_ascii_case("image/webp"))
            })
        })
    }
}

/// Format known from the request alone (precedence steps 1 to 3)
pub fn requested_output_format(
    query: Option<OutputFormat>,
    decoded: Option<OutputFormat>,
    edits: &EditsMap,
) -> Option<OutputFormat> {
    query.or(decoded).or_else(|| {
        edits
            .get("toFormat")
            .and_then(Value::as_str)
            .and_then(|f| f.parse().ok())
    })
}

/// Accept `reductionEffort` only when it is an integer within 0..=6
pub fn parse_reduction_effort(raw: Option<&str>) -> Option<u8> {
    let value = raw?.trim().parse::<i64>().ok()?;
    if (MIN_REDUCTION_EFFORT as i64..=MAX_REDUCTION_EFFORT as i64).contains(&value) {
        Some(value as u8)
    } else {
        tracing::debug!(value, "Ignoring out-of-range reductionEffort");
        None
    }
}

#[derive(Debug, Clone)]
pub struct OutputNegotiator {
    config: OutputConfig,
}

impl OutputNegotiator {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Combine the resolved request with the fetched source object
    pub fn negotiate(
        &self,
        request: ResolvedRequest,
        hints: &ClientHints,
        source: StoredObject,
    ) -> ImageRequestInfo {
        let ResolvedRequest {
            request_type,
            bucket,
            key,
            mut edits,
            headers,
            output_format,
        } = request;

        let source_is_svg = source
            .content_type
            .as_deref()
            .is_some_and(is_svg_content_type);
        let has_edits = edits.as_ref().is_some_and(|e| !e.is_empty());
        // an unedited SVG is served as stored
        let passthrough_svg = source_is_svg && !has_edits;

        let output_format = output_format
            .or_else(|| {
                (self.config.auto_webp && !passthrough_svg && hints.accepts_webp())
                    .then_some(OutputFormat::Webp)
            })
            .or_else(|| {
                if source_is_svg && has_edits {
                    let fallback = self.config.svg_fallback_format;
                    if let Some(edits) = edits.as_mut() {
                        edits
                            .entry("toFormat")
                            .or_insert_with(|| Value::from(fallback.as_str()));
                    }
                    Some(fallback)
                } else {
                    None
                }
            });

        let content_type = match output_format {
            Some(format) => format.content_type().to_string(),
            None => source
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        };

        let cache_control = header_override(headers.as_ref(), "cache-control")
            .or(source.cache_control)
            .unwrap_or_else(|| self.config.default_cache_control.clone());

        let reduction_effort = match output_format {
            Some(OutputFormat::Webp) => parse_reduction_effort(hints.reduction_effort.as_deref()),
            _ => None,
        };

        ImageRequestInfo {
            request_type,
            bucket,
            key,
            edits,
            headers,
            output_format,
            reduction_effort,
            content_type,
            cache_control,
            expires: source.expires,
            last_modified: source.last_modified,
            original_image: source.body,
        }
    }
}

fn is_svg_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(SVG_CONTENT_TYPE))
}

/// Caller-supplied header value, matched case-insensitively
fn header_override(headers: Option<&EditsMap>, name: &str) -> Option<String> {
    headers?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| v.as_str())
        .map(str::to_string)
}
