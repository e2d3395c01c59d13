//! Custom dialect: operator-supplied path rewrite, then Thumbor decoding

use std::borrow::Cow;

use regex::{Regex, RegexBuilder};

use super::thumbor::decode_thumbor;
use super::types::DecodedRequest;
use crate::config::{FilterPolicy, RewriteConfig};
use crate::error::{ImageHandlerError, Result};

/// Compiled rewrite rule
///
/// The pattern is either a bare regex or a `/pattern/flags` literal. Flags
/// `i`, `m`, `s` and `x` map onto the regex builder; `g`, `u` and `d` are
/// accepted as no-ops since every occurrence is always replaced. The
/// substitution uses `$1`, `$&` and `$$` references.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    substitution: String,
}

impl RewriteRule {
    pub fn new(match_pattern: &str, substitution: &str) -> std::result::Result<Self, String> {
        let (source, flags) = split_literal(match_pattern);

        let mut builder = RegexBuilder::new(source);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                'g' | 'u' | 'd' => {}
                other => {
                    return Err(format!(
                        "Unsupported flag '{}' in rewrite pattern '{}'",
                        other, match_pattern
                    ))
                }
            }
        }

        let pattern = builder
            .build()
            .map_err(|e| format!("Invalid rewrite pattern '{}': {}", match_pattern, e))?;

        let group_count = pattern.captures_len() - 1;
        Ok(Self {
            substitution: translate_substitution(substitution, group_count),
            pattern,
        })
    }

    pub fn from_config(config: &RewriteConfig) -> std::result::Result<Self, String> {
        Self::new(&config.match_pattern, &config.substitution)
    }

    /// Replace every match in `path`
    pub fn apply<'a>(&self, path: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(path, self.substitution.as_str())
    }
}

/// Split `/pattern/flags` into its parts
///
/// Only treated as a literal when the text after the last slash is made of
/// flag letters; `/images/(.*)` stays a bare pattern.
fn split_literal(raw: &str) -> (&str, &str) {
    if let Some(body) = raw.strip_prefix('/') {
        if let Some(end) = body.rfind('/') {
            let flags = &body[end + 1..];
            if flags.chars().all(|c| "dgimsuxy".contains(c)) {
                return (&body[..end], flags);
            }
        }
    }
    (raw, "")
}

/// Turn `$1`/`$&` references into the `${1}`/`${0}` form so a reference
/// followed by letters or digits is not read as one longer group name
///
/// A two-digit reference only counts when the pattern has that many groups;
/// otherwise `$10` is group 1 followed by a literal `0`. References to groups
/// that do not exist stay literal.
fn translate_substitution(raw: &str, group_count: usize) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(first) if first.is_ascii_digit() => {
                chars.next();
                let one = first.to_digit(10).unwrap_or(0) as usize;
                let two = chars
                    .peek()
                    .and_then(|d| d.to_digit(10))
                    .map(|second| one * 10 + second as usize)
                    .filter(|&n| (1..=group_count).contains(&n));

                if let Some(group) = two {
                    chars.next();
                    out.push_str(&format!("${{{}}}", group));
                } else if (1..=group_count).contains(&one) {
                    out.push_str(&format!("${{{}}}", one));
                } else {
                    out.push_str("$$");
                    out.push(first);
                }
            }
            _ => out.push_str("$$"),
        }
    }
    out
}

/// Rewrite the path, then decode the result with the Thumbor grammar
pub fn decode_custom(
    path: &str,
    rule: Option<&RewriteRule>,
    policy: FilterPolicy,
) -> Result<DecodedRequest> {
    let rule = rule.ok_or_else(|| {
        ImageHandlerError::configuration("custom requests need a rewrite pattern")
    })?;
    let rewritten = rule.apply(path);
    tracing::debug!(path, rewritten = %rewritten, "Rewrote custom request path");
    decode_thumbor(&rewritten, policy)
}
