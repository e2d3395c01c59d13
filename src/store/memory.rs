//! In-memory stores for testing and local runs (HashMap storage)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{BlobStore, SecretStore, StoreError, StoredObject};

/// Blob store that serves objects from a map keyed by (bucket, key)
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
    denied_buckets: Arc<RwLock<Vec<String>>>,
    calls: Arc<RwLock<Vec<(String, String)>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, object: StoredObject) {
        self.objects
            .write()
            .insert((bucket.to_string(), key.to_string()), object);
    }

    /// Make every read from `bucket` fail with access denied
    pub fn deny_bucket(&self, bucket: &str) {
        self.denied_buckets.write().push(bucket.to_string());
    }

    /// (bucket, key) pairs requested so far, in order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.read().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        self.calls
            .write()
            .push((bucket.to_string(), key.to_string()));

        if self.denied_buckets.read().iter().any(|b| b == bucket) {
            return Err(StoreError::AccessDenied);
        }

        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

/// Secret store backed by a map of secret id to key/value pairs
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
    /// Simulate errors if true
    simulate_failure: Arc<RwLock<bool>>,
    fetches: Arc<AtomicUsize>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a single-field secret
    pub fn with_secret(self, secret_id: &str, field: &str, value: &str) -> Self {
        self.secrets
            .write()
            .entry(secret_id.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        self
    }

    /// Enable failure simulation for testing
    pub fn set_failure(&self, enabled: bool) {
        *self.simulate_failure.write() = enabled;
    }

    /// Number of get_secret calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, secret_id: &str) -> Result<HashMap<String, String>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if *self.simulate_failure.read() {
            return Err(StoreError::Unavailable("Simulated failure".to_string()));
        }

        self.secrets
            .read()
            .get(secret_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}
