//! Storage collaborators
//!
//! The engine only needs two things from the outside world: the bytes and
//! metadata of a source object, and a key/value secret used for request
//! signing. Both are modelled as traits so AWS-backed and in-memory
//! implementations are interchangeable.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod memory;
pub mod s3;
pub mod secrets_manager;

pub use memory::{MemoryBlobStore, MemorySecretStore};
pub use s3::S3BlobStore;
pub use secrets_manager::SecretsManagerStore;

/// Errors reported by storage collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("secret is not a JSON object of strings: {0}")]
    InvalidSecret(String),
}

/// Source object returned by a [`BlobStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    /// HTTP-date string
    pub expires: Option<String>,
    /// HTTP-date string
    pub last_modified: Option<String>,
}

impl StoredObject {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }
}

/// Object storage: get-by-bucket/key
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError>;
}

/// Secret storage: get-by-id, returning the secret's key/value pairs
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, secret_id: &str) -> Result<HashMap<String, String>, StoreError>;
}

/// Parse a secret string holding a flat JSON object of strings
pub(crate) fn parse_secret_string(raw: &str) -> Result<HashMap<String, String>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::InvalidSecret(e.to_string()))
}
