//! S3 URL extraction
//!
//! Splits a decoded Default-dialect path into optional region, optional
//! bucket and key. Accepted shapes:
//!
//! - `[scheme://]s3[.-]<region>.amazonaws.com/<bucket>/<key>`
//! - `[scheme://]s3.amazonaws.com/<bucket>/<key>`
//! - `<bucket>/<key>`
//! - `<key>`
//!
//! A bucket is only recognized when a slash follows it, so a bare file name
//! is always a key. The separator after a bucket may be doubled
//! (`bucket//key`); a key that itself starts with `/` therefore needs a
//! third slash. Non-S3 URLs are not special-cased:
//! `https://example.com/path` yields bucket `https:` and key
//! `example.com/path`, which the allow-list then rejects.

use regex::Regex;
use std::sync::OnceLock;

static S3_URL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn get_s3_url_pattern() -> &'static Regex {
    S3_URL_PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:(?:[A-Za-z][A-Za-z0-9+.-]*://)?s3[.-](?:(?P<region>[^./]+)\.)?amazonaws\.com(?:/|$))?(?:(?P<bucket>[^/]+)/?/)?(?P<key>.*?)$",
        )
        .expect("Invalid S3 URL regex - this is a compile-time bug")
    })
}

/// Components of an S3-style object reference
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct S3Location {
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub key: String,
}

impl S3Location {
    /// Parse a decoded path (leading slash already removed)
    ///
    /// Returns `None` only when the input cannot be matched at all (it
    /// contains a line break).
    pub fn parse(path: &str) -> Option<Self> {
        let caps = get_s3_url_pattern().captures(path)?;
        Some(Self {
            region: caps.name("region").map(|m| m.as_str().to_string()),
            bucket: caps.name("bucket").map(|m| m.as_str().to_string()),
            key: caps
                .name("key")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }

    /// Render back into the virtual-host-less S3 URL form
    pub fn to_url(&self) -> String {
        let mut url = String::from("https://s3");
        if let Some(region) = &self.region {
            url.push('-');
            url.push_str(region);
        }
        url.push_str(".amazonaws.com/");
        if let Some(bucket) = &self.bucket {
            url.push_str(bucket);
            url.push('/');
            if self.key.starts_with('/') {
                url.push('/');
            }
        }
        url.push_str(&self.key);
        url
    }
}
