// Signature authorizer behaviour through the public API

use std::sync::Arc;

use image_handler::config::SignatureConfig;
use image_handler::request::SignatureAuthorizer;
use image_handler::store::MemorySecretStore;
use image_handler::ImageHandlerError;

fn config() -> SignatureConfig {
    SignatureConfig {
        enabled: true,
        secret_id: Some("serverless-image-handler".to_string()),
        secret_key_field: Some("signatureKey".to_string()),
        ..Default::default()
    }
}

fn secrets() -> MemorySecretStore {
    MemorySecretStore::new().with_secret("serverless-image-handler", "signatureKey", "secret")
}

#[tokio::test]
async fn test_sign_then_authorize() {
    let authorizer = SignatureAuthorizer::new(config(), Arc::new(secrets()));

    for payload in ["validKey", "image.svg", "folder/中文.jpg", "thumbor-image (1).jpg"] {
        let signature = authorizer.sign(payload).await.unwrap();
        assert_eq!(signature.len(), 64);
        assert!(authorizer.authorize(payload, Some(&signature)).await.is_ok());
    }
}

#[tokio::test]
async fn test_signature_is_bound_to_payload() {
    let authorizer = SignatureAuthorizer::new(config(), Arc::new(secrets()));
    let signature = authorizer.sign("validBucket/image.svg").await.unwrap();
    assert_eq!(
        signature,
        "45dd7ea1e2b875dd05b428ed515aa2aba0ea8cdbf863f13ba9b7bdadb823cd10"
    );
    assert_eq!(
        authorizer.authorize("image.svg", Some(&signature)).await,
        Err(ImageHandlerError::SignatureDoesNotMatch)
    );
}

#[tokio::test]
async fn test_empty_signature_counts_as_missing() {
    let store = secrets();
    let authorizer = SignatureAuthorizer::new(config(), Arc::new(store.clone()));
    assert_eq!(
        authorizer.authorize("validKey", Some("  ")).await,
        Err(ImageHandlerError::MissingSignature)
    );
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn test_failure_does_not_leak_cause() {
    let store = secrets();
    store.set_failure(true);
    let authorizer = SignatureAuthorizer::new(config(), Arc::new(store));

    let err = authorizer
        .authorize("validKey", Some("00"))
        .await
        .unwrap_err();
    assert_eq!(err, ImageHandlerError::SignatureValidationFailure);
    assert_eq!(err.to_http_status(), 500);
    assert!(!err.to_string().contains("Simulated"));
}

#[tokio::test]
async fn test_unknown_secret_id() {
    let mut config = config();
    config.secret_id = Some("does-not-exist".to_string());
    let authorizer = SignatureAuthorizer::new(config, Arc::new(secrets()));
    assert_eq!(
        authorizer.sign("validKey").await,
        Err(ImageHandlerError::SignatureValidationFailure)
    );
}
