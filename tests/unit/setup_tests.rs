// End-to-end request setup against in-memory stores

use std::sync::Arc;

use image_handler::config::{HandlerConfig, RewriteConfig, SignatureConfig, SignaturePayload};
use image_handler::constants::DEFAULT_CACHE_CONTROL;
use image_handler::request::{ImageHandlerEvent, ImageRequestResolver, OutputFormat, RequestType};
use image_handler::store::{MemoryBlobStore, MemorySecretStore, StoredObject};
use image_handler::ImageHandlerError;
use serde_json::{json, Value};

struct Harness {
    blobs: MemoryBlobStore,
    secrets: MemorySecretStore,
}

impl Harness {
    fn new() -> Self {
        Self {
            blobs: MemoryBlobStore::new(),
            secrets: MemorySecretStore::new().with_secret(
                "serverless-image-handler",
                "signatureKey",
                "secret",
            ),
        }
    }

    fn with_object(self, bucket: &str, key: &str, object: StoredObject) -> Self {
        self.blobs.insert(bucket, key, object);
        self
    }

    fn resolver(&self, config: HandlerConfig) -> ImageRequestResolver {
        ImageRequestResolver::new(
            config,
            Arc::new(self.blobs.clone()),
            Arc::new(self.secrets.clone()),
        )
        .expect("valid configuration")
    }
}

fn signed_config(buckets: &[&str]) -> HandlerConfig {
    let mut config = HandlerConfig::with_buckets(buckets.iter().copied());
    config.signature = SignatureConfig {
        enabled: true,
        secret_id: Some("serverless-image-handler".to_string()),
        secret_key_field: Some("signatureKey".to_string()),
        payload: SignaturePayload::Key,
    };
    config
}

fn edits(info_edits: Option<image_handler::request::EditsMap>) -> Option<Value> {
    info_edits.map(Value::Object)
}

#[tokio::test]
async fn test_default_request_with_source_metadata() {
    let mut source = StoredObject::new("SampleImageContent\n")
        .with_content_type("image/jpeg")
        .with_cache_control("max-age=300,public");
    source.expires = Some("Tue, 24 Dec 2030 13:46:28 GMT".to_string());
    source.last_modified = Some("Sat, 19 Dec 2009 16:30:47 GMT".to_string());

    let harness = Harness::new().with_object("validBucket", "validKey", source);
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket", "validBucket2"]));

    let event = ImageHandlerEvent::new("/https://s3.amazonaws.com/validBucket/validKey");
    let info = resolver.setup(&event).await.unwrap();

    assert_eq!(info.request_type, RequestType::Default);
    assert_eq!(info.bucket, "validBucket");
    assert_eq!(info.key, "validKey");
    assert_eq!(info.edits, None);
    assert_eq!(info.output_format, None);
    assert_eq!(info.content_type, "image/jpeg");
    assert_eq!(info.cache_control, "max-age=300,public");
    assert_eq!(info.expires.as_deref(), Some("Tue, 24 Dec 2030 13:46:28 GMT"));
    assert_eq!(
        info.last_modified.as_deref(),
        Some("Sat, 19 Dec 2009 16:30:47 GMT")
    );
    assert_eq!(info.original_image.as_ref(), b"SampleImageContent\n");
}

#[tokio::test]
async fn test_default_request_with_query_edits_and_headers() {
    let harness = Harness::new().with_object(
        "validBucket",
        "validKey",
        StoredObject::new("x").with_content_type("image/jpeg"),
    );
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket"]));

    let event = ImageHandlerEvent::new("/validBucket/validKey")
        .with_query("edits", r#"{"toFormat":"png","grayscale":true}"#)
        .with_query("headers", r#"{"Cache-Control":"max-age=31536000,public"}"#);
    let info = resolver.setup(&event).await.unwrap();

    assert_eq!(edits(info.edits), Some(json!({ "toFormat": "png", "grayscale": true })));
    assert_eq!(info.output_format, Some(OutputFormat::Png));
    assert_eq!(info.content_type, "image/png");
    assert_eq!(info.cache_control, "max-age=31536000,public");
    assert_eq!(
        info.headers.map(Value::Object),
        Some(json!({ "Cache-Control": "max-age=31536000,public" }))
    );
}

#[tokio::test]
async fn test_single_bucket_ignores_requested_bucket() {
    let harness = Harness::new().with_object("validBucket", "image.svg", StoredObject::new("<svg/>"));
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket"]));

    let info = resolver.setup(&ImageHandlerEvent::new("/image.svg")).await.unwrap();
    assert_eq!(info.bucket, "validBucket");
    assert_eq!(info.key, "image.svg");

    let info = resolver
        .setup(&ImageHandlerEvent::new("/otherBucket/image.svg"))
        .await
        .unwrap();
    assert_eq!(info.bucket, "validBucket");
}

#[tokio::test]
async fn test_non_ascii_key_in_default_request() {
    let harness = Harness::new().with_object("test", "中文", StoredObject::new("x"));
    let resolver = harness.resolver(HandlerConfig::with_buckets(["test", "validBucket"]));

    let info = resolver.setup(&ImageHandlerEvent::new("/test/中文")).await.unwrap();
    assert_eq!(info.bucket, "test");
    assert_eq!(info.key, "中文");
}

#[tokio::test]
async fn test_edited_svg_converts_to_png() {
    let harness = Harness::new().with_object(
        "validBucket",
        "image.svg",
        StoredObject::new("<svg/>").with_content_type("image/svg+xml"),
    );
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket"]));

    let event = ImageHandlerEvent::new("/validBucket/image.svg")
        .with_query("edits", r#"{"resize":{"width":100,"height":100}}"#);
    let info = resolver.setup(&event).await.unwrap();
    assert_eq!(info.output_format, Some(OutputFormat::Png));
    assert_eq!(info.content_type, "image/png");
    assert_eq!(
        edits(info.edits),
        Some(json!({ "resize": { "width": 100, "height": 100 }, "toFormat": "png" }))
    );

    let info = resolver
        .setup(&ImageHandlerEvent::new("/validBucket/image.svg"))
        .await
        .unwrap();
    assert_eq!(info.output_format, None);
    assert_eq!(info.content_type, "image/svg+xml");
}

#[tokio::test]
async fn test_thumbor_request_defaults() {
    let harness = Harness::new().with_object(
        "allowedBucket001",
        "thumbor-image.jpg",
        StoredObject::new("x"),
    );
    let resolver =
        harness.resolver(HandlerConfig::with_buckets(["allowedBucket001", "allowedBucket002"]));

    let event = ImageHandlerEvent::new("/filters:grayscale()/filters:rotate(90)/thumbor-image.jpg");
    let info = resolver.setup(&event).await.unwrap();

    assert_eq!(info.request_type, RequestType::Thumbor);
    assert_eq!(info.bucket, "allowedBucket001");
    assert_eq!(info.key, "thumbor-image.jpg");
    assert_eq!(edits(info.edits), Some(json!({ "grayscale": true, "rotate": 90 })));
    assert_eq!(info.content_type, "image");
    assert_eq!(info.cache_control, DEFAULT_CACHE_CONTROL);
}

#[tokio::test]
async fn test_thumbor_format_and_quality() {
    let harness = Harness::new().with_object(
        "validBucket",
        "thumbor-image.jpg",
        StoredObject::new("x").with_content_type("image/jpeg"),
    );
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket"]));

    let event =
        ImageHandlerEvent::new("/thumbor/filters:format(png)/filters:quality(50)/thumbor-image.jpg");
    let info = resolver.setup(&event).await.unwrap();

    assert_eq!(info.output_format, Some(OutputFormat::Png));
    assert_eq!(info.content_type, "image/png");
    assert_eq!(
        edits(info.edits),
        Some(json!({ "toFormat": "png", "png": { "quality": 50 } }))
    );
}

#[tokio::test]
async fn test_thumbor_s3_tag_selects_bucket() {
    let harness = Harness::new().with_object(
        "some-test-bucket",
        "thumbor-image (1).jpg",
        StoredObject::new("x"),
    );
    let resolver =
        harness.resolver(HandlerConfig::with_buckets(["validBucket", "some-test-bucket"]));

    let event = ImageHandlerEvent::new(
        "/filters:rotate(90)/s3:some-test-bucket/filters:grayscale()/thumbor-image (1).jpg",
    );
    let info = resolver.setup(&event).await.unwrap();
    assert_eq!(info.bucket, "some-test-bucket");
    assert_eq!(info.key, "thumbor-image (1).jpg");
}

#[tokio::test]
async fn test_thumbor_s3_tag_outside_allow_list() {
    let harness = Harness::new();
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket", "validBucket2"]));

    let event = ImageHandlerEvent::new("/s3:private-bucket/thumbor-image.jpg");
    assert_eq!(
        resolver.setup(&event).await,
        Err(ImageHandlerError::inaccessible_bucket("private-bucket"))
    );
    assert!(harness.blobs.calls().is_empty());
}

#[tokio::test]
async fn test_thumbor_s3_tag_kept_in_single_bucket_deployment() {
    let harness = Harness::new().with_object(
        "validBucket",
        "s3:some-test-bucket/thumbor-image.jpg",
        StoredObject::new("x"),
    );
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket"]));

    let event = ImageHandlerEvent::new("/s3:some-test-bucket/thumbor-image.jpg");
    let info = resolver.setup(&event).await.unwrap();
    assert_eq!(info.bucket, "validBucket");
    assert_eq!(info.key, "s3:some-test-bucket/thumbor-image.jpg");
}

#[tokio::test]
async fn test_custom_request() {
    let harness = Harness::new().with_object(
        "validBucket",
        "custom-image.jpg",
        StoredObject::new("x").with_content_type("image/jpeg"),
    );
    let mut config = HandlerConfig::with_buckets(["validBucket"]);
    config.rewrite = Some(RewriteConfig {
        match_pattern: "/(filters-)/gm".to_string(),
        substitution: "filters:".to_string(),
    });
    let resolver = harness.resolver(config);

    let event = ImageHandlerEvent::new("/filters-rotate(90)/filters-grayscale()/custom-image.jpg");
    let info = resolver.setup(&event).await.unwrap();

    assert_eq!(info.request_type, RequestType::Custom);
    assert_eq!(info.key, "custom-image.jpg");
    assert_eq!(edits(info.edits), Some(json!({ "rotate": 90, "grayscale": true })));
    assert_eq!(info.content_type, "image/jpeg");
}

#[tokio::test]
async fn test_envelope_request() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let harness = Harness::new().with_object("validBucket", "validKey", StoredObject::new("x"));
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket", "validBucket2"]));

    let envelope = json!({
        "bucket": "validBucket",
        "key": "validKey",
        "edits": { "grayscale": true },
        "outputFormat": "jpeg",
    });
    let event = ImageHandlerEvent::new(format!("/{}", STANDARD.encode(envelope.to_string())));
    let info = resolver.setup(&event).await.unwrap();

    assert_eq!(info.request_type, RequestType::Default);
    assert_eq!(info.bucket, "validBucket");
    assert_eq!(info.key, "validKey");
    assert_eq!(edits(info.edits), Some(json!({ "grayscale": true })));
    assert_eq!(info.output_format, Some(OutputFormat::Jpeg));
    assert_eq!(info.content_type, "image/jpeg");
}

#[tokio::test]
async fn test_reduction_effort_for_webp() {
    let harness = Harness::new().with_object("validBucket", "validKey", StoredObject::new("x"));
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket"]));

    for (raw, expected) in [("3", Some(3)), ("10", None), ("test", None)] {
        let event = ImageHandlerEvent::new("/validBucket/validKey")
            .with_query("outputFormat", "webp")
            .with_query("reductionEffort", raw);
        let info = resolver.setup(&event).await.unwrap();
        assert_eq!(info.output_format, Some(OutputFormat::Webp));
        assert_eq!(info.reduction_effort, expected, "reductionEffort={}", raw);
    }
}

#[tokio::test]
async fn test_missing_object() {
    let harness = Harness::new();
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket"]));

    let err = resolver
        .setup(&ImageHandlerEvent::new("/validBucket/missing.jpg"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ImageHandlerError::NoSuchKey {
            key: "missing.jpg".to_string()
        }
    );
    assert_eq!(err.to_http_status(), 404);
}

#[tokio::test]
async fn test_access_denied_bucket() {
    let harness = Harness::new();
    harness.blobs.deny_bucket("validBucket");
    let resolver = harness.resolver(HandlerConfig::with_buckets(["validBucket"]));

    assert_eq!(
        resolver
            .setup(&ImageHandlerEvent::new("/validBucket/validKey"))
            .await,
        Err(ImageHandlerError::inaccessible_bucket("validBucket"))
    );
}

#[tokio::test]
async fn test_signed_request() {
    let harness = Harness::new().with_object("validBucket", "validKey", StoredObject::new("x"));
    let resolver = harness.resolver(signed_config(&["validBucket"]));

    let event = ImageHandlerEvent::new("/validBucket/validKey").with_query(
        "signature",
        "51a50c092811105ec108a5f42ab75fb5761a1f5f1dc45788196aa96186ce3df9",
    );
    let info = resolver.setup(&event).await.unwrap();
    assert_eq!(info.key, "validKey");
}

#[tokio::test]
async fn test_signed_thumbor_request() {
    let harness =
        Harness::new().with_object("validBucket", "thumbor-image.jpg", StoredObject::new("x"));
    let resolver = harness.resolver(signed_config(&["validBucket"]));

    let event = ImageHandlerEvent::new("/filters:grayscale()/thumbor-image.jpg").with_query(
        "signature",
        "ee03f7c3809b114dacb9b0a62d3bfb1bb273a111a4321863a7a86a17368ede9d",
    );
    assert!(resolver.setup(&event).await.is_ok());
}

#[tokio::test]
async fn test_unsigned_request_rejected_before_fetch() {
    let harness = Harness::new().with_object("validBucket", "validKey", StoredObject::new("x"));
    let resolver = harness.resolver(signed_config(&["validBucket"]));

    let err = resolver
        .setup(&ImageHandlerEvent::new("/validBucket/validKey"))
        .await
        .unwrap_err();
    assert_eq!(err, ImageHandlerError::MissingSignature);
    assert_eq!(err.code(), "AuthorizationQueryParametersError");
    assert_eq!(harness.secrets.fetch_count(), 0);
    assert!(harness.blobs.calls().is_empty());
}

#[tokio::test]
async fn test_wrong_signature_rejected_before_fetch() {
    let harness = Harness::new().with_object("validBucket", "validKey", StoredObject::new("x"));
    let resolver = harness.resolver(signed_config(&["validBucket"]));

    let event = ImageHandlerEvent::new("/validBucket/validKey").with_query("signature", "invalid");
    assert_eq!(
        resolver.setup(&event).await,
        Err(ImageHandlerError::SignatureDoesNotMatch)
    );
    assert!(harness.blobs.calls().is_empty());
}

#[tokio::test]
async fn test_path_signature_payload() {
    let harness = Harness::new().with_object("validBucket", "validKey", StoredObject::new("x"));
    let mut config = signed_config(&["validBucket"]);
    config.signature.payload = SignaturePayload::Path;
    let resolver = harness.resolver(config);

    let event = ImageHandlerEvent::new("/https://s3.amazonaws.com/validBucket/validKey").with_query(
        "signature",
        "3fa06eb87cd62812a125369598073a0189cba78b32f1a25d7f953b3529a73bae",
    );
    assert!(resolver.setup(&event).await.is_ok());

    // The key signature is not valid for path payloads
    let event = ImageHandlerEvent::new("/https://s3.amazonaws.com/validBucket/validKey").with_query(
        "signature",
        "51a50c092811105ec108a5f42ab75fb5761a1f5f1dc45788196aa96186ce3df9",
    );
    assert_eq!(
        resolver.setup(&event).await,
        Err(ImageHandlerError::SignatureDoesNotMatch)
    );
}

#[tokio::test]
async fn test_concurrent_signed_requests_share_one_secret_fetch() {
    let harness = Harness::new().with_object("validBucket", "validKey", StoredObject::new("x"));
    let resolver = Arc::new(harness.resolver(signed_config(&["validBucket"])));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let resolver = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            let event = ImageHandlerEvent::new("/validBucket/validKey").with_query(
                "signature",
                "51a50c092811105ec108a5f42ab75fb5761a1f5f1dc45788196aa96186ce3df9",
            );
            resolver.setup(&event).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(harness.secrets.fetch_count(), 1);
}
