//! Image request resolution
//!
//! Turns an inbound request descriptor into a fully populated
//! [`ImageRequestInfo`]:
//!
//! ```text
//! event ─► detect ─► decode (Default | Thumbor | Custom)
//!       ─► bucket allow-list ─► canonical key
//!       ─► signature check ─► blob fetch ─► output negotiation
//! ```
//!
//! Everything up to the canonical key is pure; every parse failure is
//! reported before storage is touched.

pub mod bucket;
pub mod custom;
pub mod default;
pub mod detect;
pub mod filters;
pub mod key;
pub mod negotiate;
pub mod s3_url;
pub mod signature;
pub mod thumbor;
pub mod types;

use std::sync::Arc;

use crate::config::{HandlerConfig, SignaturePayload};
use crate::error::{ImageHandlerError, Result};
use crate::store::{BlobStore, SecretStore};

pub use bucket::BucketAllowList;
pub use custom::RewriteRule;
pub use negotiate::{ClientHints, OutputNegotiator};
pub use signature::SignatureAuthorizer;
pub use types::{
    DecodedRequest, EditsMap, ImageHandlerEvent, ImageRequestInfo, OutputFormat, RequestType,
    ResolvedRequest,
};

/// Entry point of the engine; built once per process and shared by requests
pub struct ImageRequestResolver {
    config: HandlerConfig,
    allow_list: BucketAllowList,
    rewrite: Option<RewriteRule>,
    authorizer: SignatureAuthorizer,
    negotiator: OutputNegotiator,
    blob_store: Arc<dyn BlobStore>,
}

impl ImageRequestResolver {
    /// Validate `config` and wire the collaborators
    pub fn new(
        config: HandlerConfig,
        blob_store: Arc<dyn BlobStore>,
        secret_store: Arc<dyn SecretStore>,
    ) -> Result<Self> {
        config.validate().map_err(ImageHandlerError::configuration)?;

        let allow_list = BucketAllowList::new(config.source_buckets.clone())?;
        let rewrite = config
            .rewrite
            .as_ref()
            .map(RewriteRule::from_config)
            .transpose()
            .map_err(ImageHandlerError::configuration)?;
        let authorizer = if config.signature.enabled {
            SignatureAuthorizer::new(config.signature.clone(), secret_store)
        } else {
            SignatureAuthorizer::disabled()
        };
        let negotiator = OutputNegotiator::new(config.output.clone());

        Ok(Self {
            config,
            allow_list,
            rewrite,
            authorizer,
            negotiator,
            blob_store,
        })
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Dialect the event's path is written in
    pub fn request_type(&self, event: &ImageHandlerEvent) -> Result<RequestType> {
        detect::detect_request_type(request_path(event)?, self.rewrite.as_ref())
    }

    /// Run the decoder for `request_type` without resolving the bucket
    pub fn decode(
        &self,
        event: &ImageHandlerEvent,
        request_type: RequestType,
    ) -> Result<DecodedRequest> {
        let path = request_path(event)?;
        match request_type {
            RequestType::Default => default::decode_default(path, event),
            RequestType::Thumbor => thumbor::decode_thumbor(path, self.config.filters),
            RequestType::Custom => {
                custom::decode_custom(path, self.rewrite.as_ref(), self.config.filters)
            }
        }
    }

    /// Resolve bucket, key, edits and requested format; no I/O
    pub fn resolve(&self, event: &ImageHandlerEvent) -> Result<ResolvedRequest> {
        let request_type = self.request_type(event)?;
        let decoded = self.decode(event, request_type)?;

        let bucket = self.allow_list.resolve(decoded.proposed_bucket())?;
        let key = decoded.canonical_key(&bucket);
        if key.is_empty() {
            return Err(ImageHandlerError::CannotFindImage);
        }

        let query_format = event
            .query("outputFormat")
            .and_then(default::parse_output_format);
        let output_format =
            negotiate::requested_output_format(query_format, decoded.output_format, &decoded.edits);

        let DecodedRequest { edits, headers, .. } = decoded;

        tracing::debug!(
            request_type = %request_type,
            bucket = %bucket,
            key = %key,
            "Resolved image request"
        );

        Ok(ResolvedRequest {
            request_type,
            bucket,
            key,
            edits: (!edits.is_empty()).then_some(edits),
            headers,
            output_format,
        })
    }

    /// Resolve, authorize, fetch and negotiate a request
    pub async fn setup(&self, event: &ImageHandlerEvent) -> Result<ImageRequestInfo> {
        let resolved = self.resolve(event)?;

        let payload = match self.config.signature.payload {
            SignaturePayload::Key => resolved.key.as_str(),
            SignaturePayload::Path => request_path(event)?,
        };
        self.authorizer
            .authorize(payload, event.query("signature"))
            .await?;

        let source = self
            .blob_store
            .get_object(&resolved.bucket, &resolved.key)
            .await
            .map_err(|e| {
                tracing::warn!(
                    bucket = %resolved.bucket,
                    key = %resolved.key,
                    error = %e,
                    "Failed to fetch source image"
                );
                ImageHandlerError::from_blob_error(e, &resolved.bucket, &resolved.key)
            })?;

        let info = self
            .negotiator
            .negotiate(resolved, &ClientHints::from_event(event), source);

        tracing::info!(
            request_type = %info.request_type,
            bucket = %info.bucket,
            key = %info.key,
            content_type = %info.content_type,
            output_format = info.output_format.map(|f| f.as_str()),
            "Image request ready"
        );

        Ok(info)
    }
}

fn request_path(event: &ImageHandlerEvent) -> Result<&str> {
    event
        .path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or(ImageHandlerError::CannotReadPath)
}
