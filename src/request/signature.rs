//! Request signature verification
//!
//! Signatures are hex-encoded HMAC-SHA256 over the canonical object key
//! (or, for legacy callers, the raw request path). The signing key lives in
//! a secret store and is fetched at most once per process: concurrent
//! first requests share one fetch, and a failed fetch is retried by the
//! next request.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::OnceCell;

use crate::config::SignatureConfig;
use crate::error::{ImageHandlerError, Result};
use crate::store::SecretStore;

type HmacSha256 = Hmac<Sha256>;

pub struct SignatureAuthorizer {
    config: SignatureConfig,
    store: Option<Arc<dyn SecretStore>>,
    signing_key: OnceCell<Vec<u8>>,
}

impl SignatureAuthorizer {
    pub fn new(config: SignatureConfig, store: Arc<dyn SecretStore>) -> Self {
        Self {
            config,
            store: Some(store),
            signing_key: OnceCell::new(),
        }
    }

    /// Authorizer that lets every request through
    pub fn disabled() -> Self {
        Self {
            config: SignatureConfig::default(),
            store: None,
            signing_key: OnceCell::new(),
        }
    }

    /// Check `signature` against the HMAC of `payload`
    ///
    /// A missing signature is rejected before the secret store is touched.
    pub async fn authorize(&self, payload: &str, signature: Option<&str>) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ImageHandlerError::MissingSignature)?;

        let mut mac = self.mac().await?;
        mac.update(payload.as_bytes());

        // Malformed hex can never match
        let provided = hex::decode(signature).map_err(|_| ImageHandlerError::SignatureDoesNotMatch)?;
        mac.verify_slice(&provided).map_err(|_| {
            tracing::warn!(payload, "Request signature does not match");
            ImageHandlerError::SignatureDoesNotMatch
        })
    }

    /// Hex HMAC-SHA256 of `payload` under the configured signing key
    pub async fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = self.mac().await?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn mac(&self) -> Result<HmacSha256> {
        let key = self.signing_key().await?;
        HmacSha256::new_from_slice(key).map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize HMAC");
            ImageHandlerError::SignatureValidationFailure
        })
    }

    async fn signing_key(&self) -> Result<&[u8]> {
        let key = self
            .signing_key
            .get_or_try_init(|| self.fetch_signing_key())
            .await?;
        Ok(key.as_slice())
    }

    async fn fetch_signing_key(&self) -> Result<Vec<u8>> {
        let (Some(store), Some(secret_id), Some(field)) = (
            self.store.as_ref(),
            self.config.secret_id.as_deref(),
            self.config.secret_key_field.as_deref(),
        ) else {
            tracing::error!("Signature verification enabled without a configured secret");
            return Err(ImageHandlerError::SignatureValidationFailure);
        };

        let secret = store.get_secret(secret_id).await.map_err(|e| {
            tracing::error!(secret_id, error = %e, "Failed to fetch signing secret");
            ImageHandlerError::SignatureValidationFailure
        })?;

        match secret.get(field) {
            Some(value) => {
                tracing::info!(secret_id, "Loaded request signing key");
                Ok(value.as_bytes().to_vec())
            }
            None => {
                tracing::error!(secret_id, field, "Signing secret has no such field");
                Err(ImageHandlerError::SignatureValidationFailure)
            }
        }
    }
}
