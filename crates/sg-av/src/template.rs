//! Variable substitution for the stream command template.

use std::collections::HashMap;
use std::path::Path;

use crate::params::StreamParams;

/// Variable substitution context for command templates.
///
/// Supports variable substitution in strings using the `{varname}` syntax.
/// Unknown placeholders are left untouched so literal braces in arguments
/// (e.g. ffmpeg filter expressions) survive.
///
/// # Example
///
/// ```
/// use sg_av::TemplateContext;
///
/// let ctx = TemplateContext::new()
///     .with_var("source", "10.0.0.5")
///     .with_var("scale", "1280:720");
///
/// assert_eq!(ctx.substitute("srt://{source}:1935"), "srt://10.0.0.5:1935");
/// assert_eq!(ctx.substitute("scale={scale}"), "scale=1280:720");
/// assert_eq!(ctx.substitute("{unknown}"), "{unknown}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty template context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the context for a stream start.
    ///
    /// This adds the following variables:
    /// - `{source}` - Resolved source address
    /// - `{resolution}` - Output dimensions as `WxH`
    /// - `{scale}` - Output dimensions as `W:H` (ffmpeg scale filter form)
    /// - `{frame_rate}` - Output frame rate
    /// - `{output_dir}` - Directory for segments and manifests
    pub fn for_stream(params: &StreamParams, output_dir: &Path) -> Self {
        Self::new()
            .with_var("source", &params.source)
            .with_var("resolution", &params.resolution)
            .with_var("scale", &params.scale())
            .with_var("frame_rate", &params.frame_rate.to_string())
            .with_var("output_dir", &output_dir.display().to_string())
    }

    /// Add a custom variable.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Get a variable value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables in a string in a single pass, so substituted
    /// values are never re-expanded.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Substitute variables in a list of strings.
    pub fn substitute_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.substitute(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn params() -> StreamParams {
        StreamParams {
            resolution: "1280x720".into(),
            frame_rate: 30,
            source: "10.0.0.5".into(),
        }
    }

    #[test]
    fn stream_vars() {
        let ctx = TemplateContext::for_stream(&params(), &PathBuf::from("/var/www/hls"));

        assert_eq!(ctx.substitute("{resolution}"), "1280x720");
        assert_eq!(ctx.substitute("scale={scale}"), "scale=1280:720");
        assert_eq!(ctx.substitute("-r {frame_rate}"), "-r 30");
        assert_eq!(
            ctx.substitute("{output_dir}/stream.m3u8"),
            "/var/www/hls/stream.m3u8"
        );
        assert_eq!(
            ctx.substitute("srt://{source}:1935?mode=caller"),
            "srt://10.0.0.5:1935?mode=caller"
        );
    }

    #[test]
    fn values_are_not_re_expanded() {
        let ctx = TemplateContext::new()
            .with_var("a", "{b}")
            .with_var("b", "oops");
        assert_eq!(ctx.substitute("{a}"), "{b}");
    }

    #[test]
    fn unterminated_brace_is_literal() {
        let ctx = TemplateContext::new().with_var("a", "x");
        assert_eq!(ctx.substitute("{a} and {a"), "x and {a");
    }

    #[test]
    fn substitute_all_keeps_order() {
        let ctx = TemplateContext::new().with_var("fps", "25");
        let args = vec!["-r".to_string(), "{fps}".to_string()];
        assert_eq!(ctx.substitute_all(&args), vec!["-r", "25"]);
    }
}
