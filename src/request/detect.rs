//! Request dialect detection

use super::custom::RewriteRule;
use super::thumbor::is_thumbor_path;
use super::types::RequestType;
use crate::error::{ImageHandlerError, Result};

/// Classify a request path
///
/// A configured rewrite rule routes everything through the Custom dialect.
/// Otherwise Thumbor grammar wins over the Default dialect, which accepts
/// any remaining path. Paths with control characters match no dialect.
pub fn detect_request_type(path: &str, rewrite: Option<&RewriteRule>) -> Result<RequestType> {
    if path.chars().any(char::is_control) {
        return Err(ImageHandlerError::UnsupportedRequestType);
    }

    if rewrite.is_some() {
        return Ok(RequestType::Custom);
    }

    if is_thumbor_path(path) {
        return Ok(RequestType::Thumbor);
    }

    Ok(RequestType::Default)
}
