//! Stream parameter resolution.
//!
//! Turns the optional, caller-supplied [`StreamRequest`] into a fully
//! resolved [`StreamParams`], applying the preset allow-list and the
//! configured (environment-aware) defaults. Pure: no I/O, no state.

use serde::{Deserialize, Serialize};
use sg_core::config::StreamConfig;
use sg_core::{Error, Result};

/// Resolution used when neither the caller nor the configuration names one.
pub const DEFAULT_RESOLUTION: &str = "1920x1080";

/// Source address used when neither the caller nor the configuration names one.
pub const DEFAULT_SOURCE: &str = "127.0.0.1";

/// Friendly resolution labels and the dimensions they stand for.
pub const RESOLUTION_PRESETS: &[(&str, &str)] = &[
    ("240p", "426x240"),
    ("360p", "640x360"),
    ("480p", "854x480"),
    ("720p", "1280x720"),
    ("1080p", "1920x1080"),
    ("1440p", "2560x1440"),
    ("2160p", "3840x2160"),
];

/// Look up the dimensions for a preset label.
pub fn preset(label: &str) -> Option<&'static str> {
    RESOLUTION_PRESETS
        .iter()
        .find(|(key, _)| *key == label)
        .map(|(_, dims)| *dims)
}

/// All preset labels, in ascending resolution order.
pub fn preset_keys() -> Vec<String> {
    RESOLUTION_PRESETS
        .iter()
        .map(|(key, _)| key.to_string())
        .collect()
}

/// Raw stream parameters as supplied by a caller. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamRequest {
    /// Preset key (e.g. `720p`) or raw `WxH` / `W:H` dimensions.
    pub resolution: Option<String>,
    /// Frame rate as received; validated to be a positive integer.
    pub frame_rate: Option<String>,
    /// Source address of the upstream feed.
    #[serde(alias = "source_ip")]
    pub source: Option<String>,
}

impl StreamRequest {
    /// Convenience constructor used by tests and the CLI.
    pub fn new(
        resolution: Option<&str>,
        frame_rate: Option<u32>,
        source: Option<&str>,
    ) -> Self {
        Self {
            resolution: resolution.map(String::from),
            frame_rate: frame_rate.map(|f| f.to_string()),
            source: source.map(String::from),
        }
    }
}

/// Fully resolved parameters handed to the child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParams {
    /// Output dimensions as `WxH`.
    pub resolution: String,
    /// Output frame rate.
    pub frame_rate: u32,
    /// Source address.
    pub source: String,
}

impl StreamParams {
    /// Dimensions in `W:H` form, as taken by ffmpeg's scale filter.
    pub fn scale(&self) -> String {
        self.resolution.replacen('x', ":", 1)
    }
}

/// Resolve a request against the configured defaults.
///
/// # Errors
///
/// - [`Error::InvalidParameter`] for an unknown resolution (the error lists
///   all preset keys) or a frame rate that is not a positive integer.
/// - [`Error::MissingParameter`] when a frame rate is required but absent.
/// - [`Error::Config`] when a configured default is itself unusable.
pub fn resolve_parameters(request: &StreamRequest, config: &StreamConfig) -> Result<StreamParams> {
    let resolution = resolve_resolution(request.resolution.as_deref(), config)?;
    let frame_rate = resolve_frame_rate(request.frame_rate.as_deref(), config)?;
    let source = resolve_source(request.source.as_deref(), config);

    Ok(StreamParams {
        resolution,
        frame_rate,
        source,
    })
}

/// The `WxH` resolution used when a request names none.
///
/// # Errors
///
/// [`Error::Config`] when the configured default is unusable.
pub fn default_resolution(config: &StreamConfig) -> Result<String> {
    resolve_resolution(None, config)
}

/// Check that the configured defaults resolve, returning human-readable
/// problems. Used at startup and by `validate`.
pub fn validate_defaults(config: &StreamConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if let Some(ref value) = config.default_resolution {
        if normalize_resolution(value).is_none() {
            problems.push(format!(
                "default resolution '{value}' is neither a preset ({}) nor WxH",
                preset_keys().join(", ")
            ));
        }
    }

    if !config.require_frame_rate && config.default_frame_rate == 0 {
        problems.push("default_frame_rate must be a positive integer".into());
    }

    problems
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Map a preset key or raw dimension string to `WxH`.
fn normalize_resolution(value: &str) -> Option<String> {
    if let Some(dims) = preset(value) {
        return Some(dims.to_string());
    }

    let (w, h) = value.split_once(['x', 'X', ':'])?;
    let w = w.trim().parse::<u32>().ok().filter(|w| *w > 0)?;
    let h = h.trim().parse::<u32>().ok().filter(|h| *h > 0)?;
    Some(format!("{w}x{h}"))
}

fn resolve_resolution(requested: Option<&str>, config: &StreamConfig) -> Result<String> {
    if let Some(value) = non_blank(requested) {
        return normalize_resolution(value).ok_or_else(|| {
            Error::invalid(
                "resolution",
                format!("'{value}' is neither a preset key nor WxH"),
                preset_keys(),
            )
        });
    }

    match non_blank(config.default_resolution.as_deref()) {
        Some(value) => normalize_resolution(value).ok_or_else(|| {
            Error::Config(format!(
                "default resolution '{value}' is neither a preset key nor WxH"
            ))
        }),
        None => Ok(DEFAULT_RESOLUTION.to_string()),
    }
}

fn resolve_frame_rate(requested: Option<&str>, config: &StreamConfig) -> Result<u32> {
    match non_blank(requested) {
        Some(value) => value
            .parse::<u32>()
            .ok()
            .filter(|fps| *fps > 0)
            .ok_or_else(|| {
                Error::invalid(
                    "frame_rate",
                    format!("'{value}' is not a positive integer"),
                    Vec::new(),
                )
            }),
        None if config.require_frame_rate => Err(Error::MissingParameter("frame_rate".into())),
        None if config.default_frame_rate == 0 => Err(Error::Config(
            "default_frame_rate must be a positive integer".into(),
        )),
        None => Ok(config.default_frame_rate),
    }
}

fn resolve_source(requested: Option<&str>, config: &StreamConfig) -> String {
    non_blank(requested)
        .or_else(|| non_blank(config.default_source.as_deref()))
        .unwrap_or(DEFAULT_SOURCE)
        .to_string()
}
