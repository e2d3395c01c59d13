//! Source bucket allow-list

use crate::error::{ImageHandlerError, Result};

/// Operator-configured buckets the engine may read from
///
/// Never empty; the first entry is the default bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAllowList {
    buckets: Vec<String>,
}

impl BucketAllowList {
    pub fn new(buckets: Vec<String>) -> Result<Self> {
        if buckets.is_empty() {
            return Err(ImageHandlerError::configuration(
                "at least one source bucket must be configured",
            ));
        }
        Ok(Self { buckets })
    }

    pub fn default_bucket(&self) -> &str {
        &self.buckets[0]
    }

    pub fn contains(&self, bucket: &str) -> bool {
        self.buckets.iter().any(|b| b == bucket)
    }

    /// Pick the bucket a request reads from
    ///
    /// - one allowed bucket: always that bucket, whatever was proposed
    /// - no proposal: the default bucket
    /// - a proposal: itself if allowed, otherwise rejected
    pub fn resolve(&self, proposed: Option<&str>) -> Result<String> {
        if self.buckets.len() == 1 {
            if let Some(proposed) = proposed.filter(|p| *p != self.default_bucket()) {
                tracing::debug!(
                    proposed,
                    bucket = self.default_bucket(),
                    "Single allowed bucket overrides requested bucket"
                );
            }
            return Ok(self.default_bucket().to_string());
        }

        match proposed {
            None => Ok(self.default_bucket().to_string()),
            Some(bucket) if self.contains(bucket) => Ok(bucket.to_string()),
            Some(bucket) => {
                tracing::warn!(bucket, "Requested bucket is not in the allow-list");
                Err(ImageHandlerError::inaccessible_bucket(bucket))
            }
        }
    }
}
