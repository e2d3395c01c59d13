//! Request and response records shared by the decoders

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ImageHandlerError;

/// Ordered mapping of edit name to its parameters
pub type EditsMap = serde_json::Map<String, serde_json::Value>;

/// Caller-supplied response header overrides
pub type HeadersMap = serde_json::Map<String, serde_json::Value>;

/// URL dialect a request is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Default,
    Thumbor,
    Custom,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Thumbor => "Thumbor",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output image encoding (closed set understood by the processing side)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
    #[serde(alias = "tif")]
    Tiff,
    #[serde(alias = "heic")]
    Heif,
    Gif,
    Avif,
    /// Raw pixel buffer
    Raw,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Tiff => "tiff",
            Self::Heif => "heif",
            Self::Gif => "gif",
            Self::Avif => "avif",
            Self::Raw => "raw",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Tiff => "image/tiff",
            Self::Heif => "image/heif",
            Self::Gif => "image/gif",
            Self::Avif => "image/avif",
            Self::Raw => "application/octet-stream",
        }
    }

    /// Encoded raster formats a client can display (everything but raw pixels)
    pub fn is_raster(&self) -> bool {
        !matches!(self, Self::Raw)
    }

    /// Formats whose encoder takes a `quality` option
    pub fn supports_quality(&self) -> bool {
        matches!(
            self,
            Self::Jpeg | Self::Png | Self::Webp | Self::Tiff | Self::Heif | Self::Avif
        )
    }

    /// Guess the format of an object key from its file extension
    pub fn from_extension(key: &str) -> Option<Self> {
        let file_name = key.rsplit('/').next()?;
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "tif" | "tiff" => Some(Self::Tiff),
            "heif" | "heic" => Some(Self::Heif),
            "gif" => Some(Self::Gif),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ImageHandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "tiff" | "tif" => Ok(Self::Tiff),
            "heif" | "heic" => Ok(Self::Heif),
            "gif" => Ok(Self::Gif),
            "avif" => Ok(Self::Avif),
            "raw" => Ok(Self::Raw),
            _ => Err(ImageHandlerError::invalid_edit(format!(
                "unknown output format: {}",
                s
            ))),
        }
    }
}

/// Inbound request descriptor handed over by the transport layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHandlerEvent {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

impl ImageHandlerEvent {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_string_parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|q| q.get(name))
            .map(String::as_str)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.as_ref().and_then(|headers| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }
}

/// What a dialect decoder extracted from the path, before bucket resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRequest {
    /// Bucket named by the request itself, if any
    pub bucket: Option<String>,
    /// Decoded object key, without any `s3:` bucket tags
    pub key: String,
    /// `s3:<bucket>` tags found in a Thumbor path, in order
    pub bucket_tags: Vec<String>,
    pub edits: EditsMap,
    pub headers: Option<HeadersMap>,
    /// Format named by the request (envelope field or format filter)
    pub output_format: Option<OutputFormat>,
}

impl DecodedRequest {
    /// Bucket proposed to the allow-list: explicit bucket, else first tag
    pub fn proposed_bucket(&self) -> Option<&str> {
        self.bucket
            .as_deref()
            .or_else(|| self.bucket_tags.first().map(String::as_str))
    }

    /// Object key once the target bucket is known
    ///
    /// Tags naming the resolved bucket are redundant and dropped; tags naming
    /// any other bucket stay in the key as a literal `s3:<bucket>/` prefix.
    pub fn canonical_key(&self, resolved_bucket: &str) -> String {
        let mut key = String::new();
        for tag in self.bucket_tags.iter().filter(|t| *t != resolved_bucket) {
            key.push_str("s3:");
            key.push_str(tag);
            key.push('/');
        }
        key.push_str(&self.key);
        key
    }
}

/// Fully resolved request, ready for authorization and storage access
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRequest {
    pub request_type: RequestType,
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edits: Option<EditsMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersMap>,
    /// Format known before source metadata is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
}

/// Canonical image request handed to the image-processing collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequestInfo {
    pub request_type: RequestType,
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edits: Option<EditsMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
    /// WebP encoder effort (0-6), when requested and valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduction_effort: Option<u8>,
    pub content_type: String,
    pub cache_control: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip)]
    pub original_image: Bytes,
}
