// Configuration loading from files and the environment

use std::io::Write;
use std::sync::Arc;

use image_handler::config::{FilterPolicy, HandlerConfig, SignaturePayload};
use image_handler::request::{ImageHandlerEvent, ImageRequestResolver, OutputFormat};
use image_handler::store::{MemoryBlobStore, MemorySecretStore};
use image_handler::ImageHandlerError;
use tempfile::NamedTempFile;

#[test]
fn test_from_file() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(
        file,
        r#"
source_buckets:
  - images
  - archive
signature:
  enabled: true
  secret_id: image-handler
  secret_key_field: signatureKey
output:
  svg_fallback_format: webp
filters: reject
"#
    )
    .expect("Failed to write config");

    let config = HandlerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.source_buckets, vec!["images", "archive"]);
    assert!(config.signature.enabled);
    assert_eq!(config.signature.payload, SignaturePayload::Key);
    assert_eq!(config.output.svg_fallback_format, OutputFormat::Webp);
    assert_eq!(config.filters, FilterPolicy::Reject);
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_file_missing() {
    let result = HandlerConfig::from_file("/nonexistent/image-handler.yaml");
    assert!(result.unwrap_err().contains("Failed to read config file"));
}

#[test]
fn test_env_substitution_in_yaml() {
    std::env::set_var("IMAGE_HANDLER_TEST_BUCKET", "substituted-bucket");
    let yaml = "source_buckets: [\"${IMAGE_HANDLER_TEST_BUCKET}\"]\n";
    let config = HandlerConfig::from_yaml_with_env(yaml).unwrap();
    assert_eq!(config.source_buckets, vec!["substituted-bucket"]);
}

#[test]
fn test_invalid_yaml() {
    let result = HandlerConfig::from_yaml_with_env("source_buckets: {not: [a list");
    assert!(result.is_err());
}

#[test]
fn test_resolver_rejects_invalid_rewrite() {
    let yaml = r#"
source_buckets: [images]
rewrite:
  match_pattern: "/(unclosed/g"
  substitution: ""
"#;
    let config = HandlerConfig::from_yaml_with_env(yaml).unwrap();
    let result = ImageRequestResolver::new(
        config,
        Arc::new(MemoryBlobStore::new()),
        Arc::new(MemorySecretStore::new()),
    );
    assert!(matches!(result, Err(ImageHandlerError::Configuration { .. })));
}

#[test]
fn test_reject_policy_surfaces_unknown_filters() {
    let yaml = "source_buckets: [images]\nfilters: reject\n";
    let config = HandlerConfig::from_yaml_with_env(yaml).unwrap();
    let resolver = ImageRequestResolver::new(
        config,
        Arc::new(MemoryBlobStore::new()),
        Arc::new(MemorySecretStore::new()),
    )
    .unwrap();

    let event = ImageHandlerEvent::new("/filters:sepia()/image.jpg");
    let err = resolver.resolve(&event).unwrap_err();
    assert_eq!(err.code(), "ImageEdits::InvalidEdit");
    assert_eq!(err.to_http_status(), 400);
}
