//! AWS Secrets Manager-backed secret store.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;

use super::{parse_secret_string, SecretStore, StoreError};

#[derive(Clone)]
pub struct SecretsManagerStore {
    client: SecretsManagerClient,
}

impl SecretsManagerStore {
    pub fn new(client: SecretsManagerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn get_secret(&self, secret_id: &str) -> Result<HashMap<String, String>, StoreError> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let raw = response.secret_string().ok_or_else(|| {
            StoreError::InvalidSecret(format!("secret '{secret_id}' has no string value"))
        })?;

        parse_secret_string(raw)
    }
}
