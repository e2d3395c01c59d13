//! Thumbor filter vocabulary
//!
//! Each `filters:name(args)` call is translated into one or more entries of
//! the edits map. Arguments arrive already split on top-level commas and
//! percent-decoded.

use serde_json::{json, Value};

use super::types::{EditsMap, OutputFormat};

/// Edits accumulated while walking a Thumbor path
#[derive(Debug, Default)]
pub(crate) struct EditState {
    pub edits: EditsMap,
    /// `fit-in/` marker seen
    pub fit_in: bool,
    /// Format named by `format(...)` or `autojpg()`
    pub output_format: Option<OutputFormat>,
    /// Deferred until the output format is known
    pub quality: Option<u8>,
}

impl EditState {
    pub fn new(fit_in: bool) -> Self {
        Self {
            fit_in,
            ..Default::default()
        }
    }

    /// Resize edit, created on first use
    pub fn resize_mut(&mut self) -> Option<&mut EditsMap> {
        self.edits
            .entry("resize")
            .or_insert_with(|| Value::Object(EditsMap::new()))
            .as_object_mut()
    }

    fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = Some(format);
        self.edits
            .insert("toFormat".to_string(), Value::from(format.as_str()));
    }

    /// Attach the deferred quality to the format-specific options
    ///
    /// The explicit format wins; otherwise the key's extension decides.
    /// Formats without a quality knob silently drop it.
    pub fn finish_quality(&mut self, key: &str) {
        let Some(quality) = self.quality else {
            return;
        };
        let format = self.output_format.or_else(|| OutputFormat::from_extension(key));
        match format {
            Some(format) if format.supports_quality() => {
                self.edits
                    .insert(format.as_str().to_string(), json!({ "quality": quality }));
            }
            _ => {
                tracing::debug!(key, quality, "No quality-capable format for quality filter");
            }
        }
    }
}

/// Why a filter call could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FilterIssue {
    Unknown,
    InvalidArguments(String),
}

/// Apply one filter call to the edit state
pub(crate) fn apply_filter(
    state: &mut EditState,
    name: &str,
    args: &[String],
) -> Result<(), FilterIssue> {
    match name {
        "autojpg" => state.set_output_format(OutputFormat::Jpeg),
        "animated" => {
            let animated = match arg(args, 0)?.to_lowercase().as_str() {
                "true" => true,
                "false" => false,
                other => return Err(invalid(format!("expected true or false, got '{}'", other))),
            };
            state.edits.insert("animated".to_string(), Value::Bool(animated));
        }
        "background_color" => {
            let color = color_value(arg(args, 0)?);
            state
                .edits
                .insert("flatten".to_string(), json!({ "background": color }));
        }
        "blur" => {
            let radius = number_arg(args, 0)?;
            let sigma = match args.get(1) {
                Some(raw) => parse_f64(raw).ok_or_else(|| invalid("sigma is not a number"))?,
                None => radius / 2.0,
            };
            if sigma <= 0.0 {
                return Err(invalid("blur amount must be positive"));
            }
            state.edits.insert("blur".to_string(), float_value(sigma));
        }
        "convolution" => {
            let kernel = arg(args, 0)?
                .split(';')
                .map(|v| parse_f64(v).map(float_value))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("kernel values must be numbers"))?;
            let width = number_arg(args, 1)?;
            if width < 1.0 || width.fract() != 0.0 || kernel.len() % width as usize != 0 {
                return Err(invalid("kernel size is not a multiple of its width"));
            }
            let width = width as usize;
            let mut convolve = json!({
                "width": width,
                "height": kernel.len() / width,
                "kernel": kernel,
            });
            let normalize = args.get(2).is_some_and(|v| v.eq_ignore_ascii_case("true"));
            if normalize {
                let sum: f64 = arg(args, 0)?.split(';').filter_map(parse_f64).sum();
                if sum != 0.0 {
                    convolve["scale"] = float_value(sum);
                }
            }
            state.edits.insert("convolve".to_string(), convolve);
        }
        "equalize" => {
            state.edits.insert("normalise".to_string(), Value::Bool(true));
        }
        "fill" => {
            let color = color_value(arg(args, 0)?);
            if let Some(resize) = state.resize_mut() {
                resize.insert("background".to_string(), color);
            }
        }
        "format" => {
            let format: OutputFormat = arg(args, 0)?
                .parse()
                .map_err(|_| invalid(format!("unknown format '{}'", args[0])))?;
            state.set_output_format(format);
        }
        "grayscale" => {
            state.edits.insert("grayscale".to_string(), Value::Bool(true));
        }
        "no_upscale" => {
            if let Some(resize) = state.resize_mut() {
                resize.insert("withoutEnlargement".to_string(), Value::Bool(true));
            }
        }
        "proportion" => {
            let ratio = number_arg(args, 0)?;
            if ratio <= 0.0 {
                return Err(invalid("proportion must be positive"));
            }
            state.edits.insert("proportion".to_string(), float_value(ratio));
        }
        "quality" => {
            let quality = arg(args, 0)?
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|q| (1..=100).contains(q))
                .ok_or_else(|| invalid("quality must be between 1 and 100"))?;
            state.quality = Some(quality);
        }
        "rgb" => {
            let r = number_arg(args, 0)?;
            let g = number_arg(args, 1)?;
            let b = number_arg(args, 2)?;
            state.edits.insert(
                "tint".to_string(),
                json!({
                    "r": percent_to_channel(r),
                    "g": percent_to_channel(g),
                    "b": percent_to_channel(b),
                }),
            );
        }
        "rotate" => {
            let degrees = number_arg(args, 0)?;
            state.edits.insert("rotate".to_string(), float_value(degrees));
        }
        "sharpen" => {
            let radius = number_arg(args, 1)?;
            state
                .edits
                .insert("sharpen".to_string(), float_value(1.0 + radius / 2.0));
        }
        "stretch" => {
            let fit_in = state.fit_in;
            if let Some(resize) = state.resize_mut() {
                if !fit_in {
                    resize.insert("fit".to_string(), Value::from("fill"));
                }
            }
        }
        "strip_exif" => {
            state.edits.insert("stripExif".to_string(), Value::Bool(true));
        }
        "strip_icc" => {
            state.edits.insert("stripIcc".to_string(), Value::Bool(true));
        }
        "upscale" => {
            if let Some(resize) = state.resize_mut() {
                resize.insert("fit".to_string(), Value::from("inside"));
            }
        }
        "watermark" => {
            if args.len() < 4 {
                return Err(invalid("watermark needs bucket, key, x and y"));
            }
            let mut watermark = json!({
                "bucket": args[0],
                "key": args[1],
                "x": scalar_value(&args[2]),
                "y": scalar_value(&args[3]),
            });
            if let Some(alpha) = args.get(4) {
                watermark["alpha"] = scalar_value(alpha);
            }
            if let Some(w_ratio) = args.get(5) {
                watermark["wRatio"] = scalar_value(w_ratio);
            }
            if let Some(h_ratio) = args.get(6) {
                watermark["hRatio"] = scalar_value(h_ratio);
            }
            state.edits.insert("watermark".to_string(), watermark);
        }
        _ => return Err(FilterIssue::Unknown),
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> FilterIssue {
    FilterIssue::InvalidArguments(message.into())
}

fn arg(args: &[String], index: usize) -> Result<&str, FilterIssue> {
    args.get(index)
        .map(String::as_str)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| invalid(format!("missing argument {}", index + 1)))
}

fn number_arg(args: &[String], index: usize) -> Result<f64, FilterIssue> {
    let raw = arg(args, index)?;
    parse_f64(raw).ok_or_else(|| invalid(format!("'{}' is not a number", raw)))
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integral values serialize as JSON integers
fn float_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Number when the argument parses as one, string otherwise
fn scalar_value(raw: &str) -> Value {
    parse_f64(raw)
        .map(float_value)
        .unwrap_or_else(|| Value::from(raw))
}

/// Thumbor rgb() takes -100..100 percentages
fn percent_to_channel(percent: f64) -> Value {
    let clamped = percent.clamp(-100.0, 100.0);
    float_value(((clamped + 100.0) / 200.0 * 255.0).round())
}

/// `ffffff` / `#fff` become an RGBA object; anything else stays a string
fn color_value(raw: &str) -> Value {
    let hex = raw.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return Value::from(raw);
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return Value::from(raw),
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => {
            json!({ "r": r, "g": g, "b": b, "alpha": 1 })
        }
        _ => Value::from(raw),
    }
}
