// Constants module - centralized default values and environment variable names
//
// Using constants instead of magic strings keeps the legacy environment
// contract and the response defaults in one place.

// =============================================================================
// Response defaults
// =============================================================================

/// Default Cache-Control when the source object supplies none (one year, public)
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=31536000,public";

/// Content-Type used when neither an output format nor the source object names one
pub const DEFAULT_CONTENT_TYPE: &str = "image";

/// Content-Type reported by object storage for vector images
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

// =============================================================================
// Encoder hints
// =============================================================================

/// Inclusive bounds for the `reductionEffort` query parameter
pub const MIN_REDUCTION_EFFORT: u8 = 0;
pub const MAX_REDUCTION_EFFORT: u8 = 6;

// =============================================================================
// Environment variables (legacy deployment contract)
// =============================================================================

pub const ENV_SOURCE_BUCKETS: &str = "SOURCE_BUCKETS";
pub const ENV_ENABLE_SIGNATURE: &str = "ENABLE_SIGNATURE";
pub const ENV_SECRETS_MANAGER: &str = "SECRETS_MANAGER";
pub const ENV_SECRET_KEY: &str = "SECRET_KEY";
pub const ENV_REWRITE_MATCH_PATTERN: &str = "REWRITE_MATCH_PATTERN";
pub const ENV_REWRITE_SUBSTITUTION: &str = "REWRITE_SUBSTITUTION";
pub const ENV_AUTO_WEBP: &str = "AUTO_WEBP";
