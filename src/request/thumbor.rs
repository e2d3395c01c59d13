//! Thumbor-style path decoding
//!
//! A Thumbor path is a prefix of grammar tokens followed by the object key:
//!
//! ```text
//! [thumbor/][unsafe/][fit-in/][AxB:CxD/][WxH/][filters:f(args)[:g(args)]/...]<key>
//! ```
//!
//! `s3:<bucket>/` tags may appear anywhere in the prefix. The prefix is
//! consumed token by token; the first segment that is not an acceptable
//! token at its position starts the key, and everything from there on
//! (slashes included) is the key. Grammar-like text inside the key, such as
//! `beach-100x100.jpg` or `fit-in-image.jpg`, is therefore never stripped.

use super::filters::{apply_filter, EditState, FilterIssue};
use super::key::decode_key;
use super::types::DecodedRequest;
use crate::config::FilterPolicy;
use crate::error::{ImageHandlerError, Result};
use serde_json::{json, Value};

/// One recognized prefix segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Thumbor,
    Unsafe,
    FitIn,
    Crop {
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
    },
    /// Negative dimensions mirror the image on that axis
    Resize {
        width: u32,
        height: u32,
        flop: bool,
        flip: bool,
    },
    Filters(Vec<FilterCall<'a>>),
    BucketTag(&'a str),
}

/// `name(arg,arg,...)` with arguments still percent-encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FilterCall<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
}

/// Tokenized path: grammar prefix plus the raw (undecoded) key
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ThumborPath<'a> {
    pub tokens: Vec<Token<'a>>,
    pub key: &'a str,
}

/// Which parts of the grammar have been consumed so far
#[derive(Debug, Default)]
struct Progress {
    any: bool,
    unsafe_marker: bool,
    fit_in: bool,
    crop: bool,
    resize: bool,
    filters: bool,
}

impl Progress {
    fn accepts(&self, token: &Token<'_>) -> bool {
        match token {
            Token::Thumbor => !self.any,
            Token::Unsafe => {
                !(self.unsafe_marker || self.fit_in || self.crop || self.resize || self.filters)
            }
            Token::FitIn => !(self.fit_in || self.resize || self.filters),
            Token::Crop { .. } => !(self.crop || self.resize || self.filters),
            Token::Resize { .. } => !(self.resize || self.filters),
            Token::Filters(_) | Token::BucketTag(_) => true,
        }
    }

    fn record(&mut self, token: &Token<'_>) {
        self.any = true;
        match token {
            Token::Unsafe => self.unsafe_marker = true,
            Token::FitIn => self.fit_in = true,
            Token::Crop { .. } => self.crop = true,
            Token::Resize { .. } => self.resize = true,
            Token::Filters(_) => self.filters = true,
            Token::Thumbor | Token::BucketTag(_) => {}
        }
    }
}

/// Split a path into grammar tokens and the key that follows them
pub(crate) fn tokenize(path: &str) -> ThumborPath<'_> {
    let mut pos = 0;
    let mut progress = Progress::default();
    let mut tokens = Vec::new();

    loop {
        pos += path[pos..].len() - path[pos..].trim_start_matches('/').len();
        let Some((token, consumed)) = next_token(&path[pos..]) else {
            break;
        };
        if !progress.accepts(&token) {
            break;
        }
        progress.record(&token);
        tokens.push(token);
        pos += consumed;
    }

    ThumborPath {
        tokens,
        key: &path[pos..],
    }
}

/// Whether a path is written in the Thumbor grammar
pub fn is_thumbor_path(path: &str) -> bool {
    !tokenize(path).tokens.is_empty()
        || path.split('/').any(|segment| segment.starts_with("filters:"))
}

fn next_token(rest: &str) -> Option<(Token<'_>, usize)> {
    if rest.starts_with("filters:") {
        return scan_filters(rest).map(|(calls, consumed)| (Token::Filters(calls), consumed));
    }

    // Every other token needs a following slash; a trailing segment is the key
    let end = rest.find('/')?;
    let segment = &rest[..end];
    let token = match segment {
        "thumbor" => Token::Thumbor,
        "unsafe" => Token::Unsafe,
        "fit-in" => Token::FitIn,
        _ => {
            if let Some(bucket) = segment.strip_prefix("s3:") {
                if bucket.is_empty() {
                    return None;
                }
                Token::BucketTag(bucket)
            } else if let Some(crop) = parse_crop(segment) {
                crop
            } else {
                parse_resize(segment)?
            }
        }
    };
    Some((token, end + 1))
}

/// Scan `filters:a(...)[:b(...)]` up to the closing slash (or end of input)
///
/// Parentheses are matched by depth, so arguments may contain `/` and
/// nested parentheses. Returns `None` when the segment is not well formed.
fn scan_filters(rest: &str) -> Option<(Vec<FilterCall<'_>>, usize)> {
    let bytes = rest.as_bytes();
    let mut pos = "filters:".len();
    let mut calls = Vec::new();

    loop {
        let name_start = pos;
        while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
            pos += 1;
        }
        if pos == name_start || bytes.get(pos) != Some(&b'(') {
            return None;
        }
        let name = &rest[name_start..pos];

        pos += 1;
        let args_start = pos;
        let mut depth = 1usize;
        while pos < bytes.len() {
            match bytes[pos] {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            pos += 1;
        }
        if depth != 0 {
            return None;
        }
        calls.push(FilterCall {
            name,
            args: split_args(&rest[args_start..pos]),
        });
        pos += 1;

        match bytes.get(pos) {
            None => return Some((calls, pos)),
            Some(b'/') => return Some((calls, pos + 1)),
            Some(b':') => pos += 1,
            Some(_) => return None,
        }
    }
}

/// Split on commas that are not inside parentheses
fn split_args(args: &str) -> Vec<&str> {
    if args.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in args.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts
}

fn parse_pair(segment: &str) -> Option<(&str, &str)> {
    let (a, b) = segment.split_once('x')?;
    Some((a, b))
}

fn parse_unsigned(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn parse_signed(raw: &str) -> Option<(u32, bool)> {
    match raw.strip_prefix('-') {
        Some(abs) => parse_unsigned(abs).map(|v| (v, true)),
        None => parse_unsigned(raw).map(|v| (v, false)),
    }
}

fn parse_crop(segment: &str) -> Option<Token<'static>> {
    let (top_left, bottom_right) = segment.split_once(':')?;
    let (left, top) = parse_pair(top_left)?;
    let (right, bottom) = parse_pair(bottom_right)?;
    Some(Token::Crop {
        left: parse_unsigned(left)?,
        top: parse_unsigned(top)?,
        right: parse_unsigned(right)?,
        bottom: parse_unsigned(bottom)?,
    })
}

fn parse_resize(segment: &str) -> Option<Token<'static>> {
    let (width, height) = parse_pair(segment)?;
    let (width, flop) = parse_signed(width)?;
    let (height, flip) = parse_signed(height)?;
    Some(Token::Resize {
        width,
        height,
        flop,
        flip,
    })
}

/// Decode a Thumbor path into edits and a key
pub fn decode_thumbor(path: &str, policy: FilterPolicy) -> Result<DecodedRequest> {
    let parsed = tokenize(path);
    let fit_in = parsed.tokens.iter().any(|t| matches!(t, Token::FitIn));
    let mut state = EditState::new(fit_in);
    let mut bucket_tags = Vec::new();

    for token in &parsed.tokens {
        match token {
            Token::Thumbor | Token::Unsafe | Token::FitIn => {}
            Token::Crop {
                left,
                top,
                right,
                bottom,
            } => apply_crop(&mut state, *left, *top, *right, *bottom)?,
            Token::Resize {
                width,
                height,
                flop,
                flip,
            } => apply_resize(&mut state, *width, *height, *flop, *flip),
            Token::Filters(calls) => {
                for call in calls {
                    apply_call(&mut state, call, policy)?;
                }
            }
            Token::BucketTag(bucket) => bucket_tags.push(bucket.to_string()),
        }
    }

    let key = decode_key(parsed.key)?;
    if key.is_empty() {
        return Err(ImageHandlerError::CannotFindImage);
    }
    state.finish_quality(&key);

    Ok(DecodedRequest {
        bucket: None,
        key,
        bucket_tags,
        edits: state.edits,
        headers: None,
        output_format: state.output_format,
    })
}

fn apply_crop(state: &mut EditState, left: u32, top: u32, right: u32, bottom: u32) -> Result<()> {
    if left == 0 && top == 0 && right == 0 && bottom == 0 {
        return Ok(());
    }
    if right <= left || bottom <= top {
        return Err(ImageHandlerError::invalid_edit(format!(
            "crop {}x{}:{}x{} has no area",
            left, top, right, bottom
        )));
    }
    state.edits.insert(
        "crop".to_string(),
        json!({
            "left": left,
            "top": top,
            "width": right - left,
            "height": bottom - top,
        }),
    );
    Ok(())
}

fn apply_resize(state: &mut EditState, width: u32, height: u32, flop: bool, flip: bool) {
    if flop {
        state.edits.insert("flop".to_string(), Value::Bool(true));
    }
    if flip {
        state.edits.insert("flip".to_string(), Value::Bool(true));
    }
    // 0 means "keep aspect ratio" on that axis; 0x0 means no resize at all
    if width == 0 && height == 0 {
        return;
    }
    let fit = if state.fit_in { "contain" } else { "cover" };
    if let Some(resize) = state.resize_mut() {
        if width > 0 {
            resize.insert("width".to_string(), Value::from(width));
        }
        if height > 0 {
            resize.insert("height".to_string(), Value::from(height));
        }
        resize.insert("fit".to_string(), Value::from(fit));
    }
}

fn apply_call(state: &mut EditState, call: &FilterCall<'_>, policy: FilterPolicy) -> Result<()> {
    let args = call
        .args
        .iter()
        .map(|a| urlencoding::decode(a).map(|d| d.into_owned()))
        .collect::<std::result::Result<Vec<_>, _>>();

    let outcome = match args {
        Ok(args) => apply_filter(state, call.name, &args),
        Err(_) => Err(FilterIssue::InvalidArguments(
            "arguments are not valid percent-encoded UTF-8".to_string(),
        )),
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(issue) => handle_filter_issue(policy, call.name, issue),
    }
}

fn handle_filter_issue(policy: FilterPolicy, name: &str, issue: FilterIssue) -> Result<()> {
    let reason = match issue {
        FilterIssue::Unknown => format!("unsupported filter '{}'", name),
        FilterIssue::InvalidArguments(message) => format!("filter '{}': {}", name, message),
    };
    match policy {
        FilterPolicy::Ignore => {
            tracing::warn!(filter = name, reason = %reason, "Ignoring Thumbor filter");
            Ok(())
        }
        FilterPolicy::Reject => Err(ImageHandlerError::invalid_edit(reason)),
    }
}
