// Image Handler Library
// Resolves image requests (Default, Thumbor and Custom URL dialects) into
// canonical image requests backed by S3-compatible object storage.

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod request; // Dialect detection, decoding, authorization, negotiation
pub mod store; // Blob and secret storage collaborators

pub use config::HandlerConfig;
pub use error::{ImageHandlerError, Result};
pub use request::{ImageHandlerEvent, ImageRequestInfo, ImageRequestResolver};
