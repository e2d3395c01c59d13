//! S3-backed blob store.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::DateTimeFormat;
use aws_sdk_s3::Client as S3Client;

use super::{BlobStore, StoreError, StoredObject};

/// Fetches source images with the AWS SDK
#[derive(Clone)]
pub struct S3BlobStore {
    client: S3Client,
}

impl S3BlobStore {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(map_get_object_error)?;

        let content_type = response.content_type().map(str::to_string);
        let cache_control = response.cache_control().map(str::to_string);
        let expires = response.expires_string().map(str::to_string);
        let last_modified = response
            .last_modified()
            .and_then(|dt| dt.fmt(DateTimeFormat::HttpDate).ok());

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to read S3 body: {e}")))?
            .into_bytes();

        Ok(StoredObject {
            body,
            content_type,
            cache_control,
            expires,
            last_modified,
        })
    }
}

fn map_get_object_error(err: SdkError<GetObjectError>) -> StoreError {
    let service_error = match err {
        SdkError::ServiceError(service) => service.into_err(),
        other => return StoreError::Unavailable(other.to_string()),
    };

    if service_error.is_no_such_key() {
        return StoreError::NotFound;
    }

    match service_error.code() {
        Some("NoSuchKey") | Some("NotFound") => StoreError::NotFound,
        Some("AccessDenied") | Some("NoSuchBucket") | Some("AllAccessDisabled") => {
            StoreError::AccessDenied
        }
        _ => StoreError::Unavailable(service_error.to_string()),
    }
}
