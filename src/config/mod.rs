// Configuration module
//
// The handler configuration is built once per process (from YAML or from the
// legacy environment variables) and shared immutably by every component.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::constants::{
    DEFAULT_CACHE_CONTROL, ENV_AUTO_WEBP, ENV_ENABLE_SIGNATURE, ENV_REWRITE_MATCH_PATTERN,
    ENV_REWRITE_SUBSTITUTION, ENV_SECRETS_MANAGER, ENV_SECRET_KEY, ENV_SOURCE_BUCKETS,
};
use crate::request::custom::RewriteRule;
use crate::request::types::OutputFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Buckets the engine may read from; the first entry is the default bucket
    pub source_buckets: Vec<String>,
    #[serde(default)]
    pub signature: SignatureConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    /// What to do with Thumbor filters the engine does not understand
    #[serde(default)]
    pub filters: FilterPolicy,
}

/// Request signing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SignatureConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Secret store identifier holding the signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<String>,
    /// Field of the secret whose value is the HMAC key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_field: Option<String>,
    #[serde(default)]
    pub payload: SignaturePayload,
}

/// What the request signature is computed over
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignaturePayload {
    /// The canonical object key
    #[default]
    Key,
    /// The raw request path, for callers signing the legacy way
    Path,
}

/// Custom dialect rewrite: one regex substitution applied to the raw path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewriteConfig {
    /// Bare regex or a `/pattern/flags` literal
    pub match_pattern: String,
    #[serde(default)]
    pub substitution: String,
}

/// Output negotiation defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputConfig {
    /// Raster format used when an edited SVG has no explicit output format
    #[serde(default = "default_svg_fallback_format")]
    pub svg_fallback_format: OutputFormat,
    #[serde(default = "default_cache_control")]
    pub default_cache_control: String,
    /// Serve WebP to clients whose Accept header allows it
    #[serde(default)]
    pub auto_webp: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            svg_fallback_format: default_svg_fallback_format(),
            default_cache_control: default_cache_control(),
            auto_webp: false,
        }
    }
}

fn default_svg_fallback_format() -> OutputFormat {
    OutputFormat::Png
}

fn default_cache_control() -> String {
    DEFAULT_CACHE_CONTROL.to_string()
}

/// Policy for unrecognized Thumbor filter names (and unusable filter arguments)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Drop the filter and keep resolving
    #[default]
    Ignore,
    /// Fail the request with an invalid-edit error
    Reject,
}

impl HandlerConfig {
    /// Minimal configuration for the given allow-list
    pub fn with_buckets<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_buckets: buckets.into_iter().map(Into::into).collect(),
            signature: SignatureConfig::default(),
            rewrite: None,
            output: OutputConfig::default(),
            filters: FilterPolicy::default(),
        }
    }

    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        // First, check that all referenced environment variables exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        let mut config: HandlerConfig =
            serde_yaml::from_str(&substituted).map_err(|e| e.to_string())?;
        config.normalize();
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    /// Build from the legacy environment variables of the process
    pub fn from_env() -> Result<Self, String> {
        Self::from_env_lookup(|name| std::env::var(name).ok())
    }

    /// Build from legacy environment variables served by `lookup`
    pub fn from_env_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let buckets = lookup(ENV_SOURCE_BUCKETS)
            .ok_or_else(|| format!("Environment variable '{}' is not set", ENV_SOURCE_BUCKETS))?;

        let mut config = Self::with_buckets(buckets.split(','));

        config.signature = SignatureConfig {
            enabled: lookup(ENV_ENABLE_SIGNATURE)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            secret_id: lookup(ENV_SECRETS_MANAGER),
            secret_key_field: lookup(ENV_SECRET_KEY),
            payload: SignaturePayload::default(),
        };

        let pattern = lookup(ENV_REWRITE_MATCH_PATTERN).filter(|p| !p.is_empty());
        if let Some(match_pattern) = pattern {
            config.rewrite = Some(RewriteConfig {
                match_pattern,
                substitution: lookup(ENV_REWRITE_SUBSTITUTION).unwrap_or_default(),
            });
        }

        config.output.auto_webp = lookup(ENV_AUTO_WEBP)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        config.normalize();
        Ok(config)
    }

    /// Trim bucket names and drop empty entries
    fn normalize(&mut self) {
        self.source_buckets = self
            .source_buckets
            .iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.source_buckets.is_empty() {
            return Err("At least one source bucket must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for bucket in &self.source_buckets {
            if bucket.is_empty() {
                return Err("Source bucket name cannot be empty".to_string());
            }
            if !seen.insert(bucket) {
                return Err(format!("Duplicate source bucket '{}'", bucket));
            }
        }

        if self.signature.enabled {
            let secret_id = self.signature.secret_id.as_deref().unwrap_or("");
            if secret_id.trim().is_empty() {
                return Err("signature.secret_id is required when signatures are enabled".to_string());
            }
            let field = self.signature.secret_key_field.as_deref().unwrap_or("");
            if field.trim().is_empty() {
                return Err(
                    "signature.secret_key_field is required when signatures are enabled"
                        .to_string(),
                );
            }
        }

        if let Some(rewrite) = &self.rewrite {
            RewriteRule::from_config(rewrite)?;
        }

        if !self.output.svg_fallback_format.is_raster() {
            return Err(format!(
                "output.svg_fallback_format '{}' is not a raster format",
                self.output.svg_fallback_format.as_str()
            ));
        }

        Ok(())
    }
}

/// Legacy flags accept "Yes"/"true"/"1" in any case
fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "yes" | "true" | "1" | "on"
    )
}
