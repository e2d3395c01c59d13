//! Error types for image request resolution
//!
//! Every failure carries an HTTP status, a stable machine-readable code and
//! a human-readable message. None of them are retried internally.

use std::fmt;

use crate::store::StoreError;

/// Centralized error type for the image request engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageHandlerError {
    // === Decoding Errors ===
    /// Request carried no usable path
    CannotReadPath,
    /// Path could not be decoded (bad percent-encoding, bad envelope)
    CannotDecodeRequest,
    /// A JSON-encoded parameter (`edits`, `headers`, envelope) failed to parse
    MalformedJson { param: String },
    /// A structurally valid edit carried unusable values
    InvalidEdit { message: String },
    /// No dialect could handle the request
    UnsupportedRequestType,

    // === Resolution Errors ===
    /// Bucket is not in the allow-list or could not be read
    InaccessibleBucket { bucket: String },
    /// No object key could be resolved from the request
    CannotFindImage,
    /// Blob store reported the object as missing
    NoSuchKey { key: String },

    // === Authorization Errors ===
    /// Signatures are enabled but the request carried none
    MissingSignature,
    /// Supplied signature differs from the expected one
    SignatureDoesNotMatch,
    /// Secret retrieval or HMAC computation failed
    SignatureValidationFailure,

    // === Internal Errors ===
    /// Operator configuration is missing or invalid
    Configuration { message: String },
    /// Blob store failed for a reason other than not-found/access-denied
    Storage { message: String },
}

impl fmt::Display for ImageHandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageHandlerError::CannotReadPath => write!(
                f,
                "The URL path you provided could not be read. Please ensure that it is properly formed according to the solution documentation."
            ),
            ImageHandlerError::CannotDecodeRequest => write!(
                f,
                "The image request you provided could not be decoded. Please check that your request is base64 encoded properly and refers to a valid S3 bucket and key."
            ),
            ImageHandlerError::MalformedJson { param } => {
                write!(f, "The '{}' parameter is not valid JSON.", param)
            }
            ImageHandlerError::InvalidEdit { message } => {
                write!(f, "Invalid image edit: {}", message)
            }
            ImageHandlerError::UnsupportedRequestType => write!(
                f,
                "The type of request you are making could not be processed. Please ensure that your original image is of a supported file type (jpg, png, tiff, webp, svg, gif, avif) and that your image request is provided in the correct syntax."
            ),
            ImageHandlerError::InaccessibleBucket { bucket } => write!(
                f,
                "The bucket '{}' could not be accessed. Please check that the bucket is specified in your source buckets.",
                bucket
            ),
            ImageHandlerError::CannotFindImage => write!(
                f,
                "The image you specified could not be found. Please check your request syntax as well as the bucket you specified to ensure it exists."
            ),
            ImageHandlerError::NoSuchKey { key } => write!(
                f,
                "The image {} does not exist or the request may not be base64 encoded properly.",
                key
            ),
            ImageHandlerError::MissingSignature => {
                write!(f, "Query-string requires the signature parameter.")
            }
            ImageHandlerError::SignatureDoesNotMatch => write!(f, "Signature does not match."),
            ImageHandlerError::SignatureValidationFailure => {
                write!(f, "Signature validation failed.")
            }
            ImageHandlerError::Configuration { message } => {
                write!(f, "Configuration error: {}", message)
            }
            ImageHandlerError::Storage { message } => write!(f, "Storage error: {}", message),
        }
    }
}

impl std::error::Error for ImageHandlerError {}

impl ImageHandlerError {
    /// Maps errors to HTTP status codes
    ///
    /// Status mapping:
    /// - decoding and missing-signature errors → 400
    /// - bucket rejection and signature mismatch → 403
    /// - unresolvable key / missing object → 404
    /// - configuration, storage and secret failures → 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            ImageHandlerError::CannotReadPath
            | ImageHandlerError::CannotDecodeRequest
            | ImageHandlerError::MalformedJson { .. }
            | ImageHandlerError::InvalidEdit { .. }
            | ImageHandlerError::UnsupportedRequestType
            | ImageHandlerError::MissingSignature => 400,

            ImageHandlerError::InaccessibleBucket { .. }
            | ImageHandlerError::SignatureDoesNotMatch => 403,

            ImageHandlerError::CannotFindImage | ImageHandlerError::NoSuchKey { .. } => 404,

            ImageHandlerError::SignatureValidationFailure
            | ImageHandlerError::Configuration { .. }
            | ImageHandlerError::Storage { .. } => 500,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ImageHandlerError::CannotReadPath => "DecodeRequest::CannotReadPath",
            ImageHandlerError::CannotDecodeRequest => "DecodeRequest::CannotDecodeRequest",
            ImageHandlerError::MalformedJson { .. } => "DecodeRequest::MalformedJSON",
            ImageHandlerError::InvalidEdit { .. } => "ImageEdits::InvalidEdit",
            ImageHandlerError::UnsupportedRequestType => "RequestTypeError",
            ImageHandlerError::InaccessibleBucket { .. } => "ImageBucket::CannotAccessBucket",
            ImageHandlerError::CannotFindImage => "ImageEdits::CannotFindImage",
            ImageHandlerError::NoSuchKey { .. } => "NoSuchKey",
            ImageHandlerError::MissingSignature => "AuthorizationQueryParametersError",
            ImageHandlerError::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            ImageHandlerError::SignatureValidationFailure => "SignatureValidationFailure",
            ImageHandlerError::Configuration { .. } => "ConfigurationError",
            ImageHandlerError::Storage { .. } => "InternalError",
        }
    }

    /// Response body handed to the transport layer
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.to_http_status(),
            "code": self.code(),
            "message": self.to_string(),
        })
    }

    /// Map a blob store failure for `bucket`/`key` into the taxonomy
    pub fn from_blob_error(err: StoreError, bucket: &str, key: &str) -> Self {
        match err {
            StoreError::NotFound => ImageHandlerError::NoSuchKey {
                key: key.to_string(),
            },
            StoreError::AccessDenied => ImageHandlerError::InaccessibleBucket {
                bucket: bucket.to_string(),
            },
            other => ImageHandlerError::Storage {
                message: other.to_string(),
            },
        }
    }

    pub fn malformed_json(param: impl Into<String>) -> Self {
        ImageHandlerError::MalformedJson {
            param: param.into(),
        }
    }

    pub fn invalid_edit(message: impl Into<String>) -> Self {
        ImageHandlerError::InvalidEdit {
            message: message.into(),
        }
    }

    pub fn inaccessible_bucket(bucket: impl Into<String>) -> Self {
        ImageHandlerError::InaccessibleBucket {
            bucket: bucket.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ImageHandlerError::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageHandlerError>;
