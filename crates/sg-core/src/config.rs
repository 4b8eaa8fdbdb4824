//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! server and stream sections. Every section defaults sensibly so an empty
//! file is valid. Environment overrides are layered on top after loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Default locations searched when no config path is given.
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./streamgauge.toml",
    "~/.config/streamgauge/config.toml",
    "/etc/streamgauge/config.toml",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stream: StreamConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("parse error: {e}")))
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Load configuration from `path`, or from the first default location
    /// that exists, falling back to defaults when none is found.
    ///
    /// An explicit path that cannot be read or parsed is an error; the
    /// default locations are only probed for existence.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(candidate);
            let candidate = Path::new(expanded.as_ref());
            if candidate.exists() {
                tracing::info!("Loading config from {}", candidate.display());
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found; using defaults");
        Ok(Self::default())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` as the environment source.
    ///
    /// - `SOURCE_IP` sets `stream.default_source`
    /// - `SCALE_VALUE` sets `stream.default_resolution`
    /// - `HLS_PATH` sets `stream.output_dir`
    /// - `STREAMGAUGE_PORT` sets `server.port`
    ///
    /// Blank values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(source) = get("SOURCE_IP") {
            self.stream.default_source = Some(source);
        }
        if let Some(scale) = get("SCALE_VALUE") {
            self.stream.default_resolution = Some(scale);
        }
        if let Some(dir) = get("HLS_PATH") {
            self.stream.output_dir = PathBuf::from(dir);
        }
        if let Some(port) = get("STREAMGAUGE_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(e) => tracing::warn!("Ignoring STREAMGAUGE_PORT '{port}': {e}"),
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.stream.program.trim().is_empty() {
            warnings.push("stream.program is empty; starting a stream will fail".into());
        }

        if self.stream.graceful_timeout_secs == 0 {
            warnings.push(
                "stream.graceful_timeout_secs is 0; stop will force-kill immediately".into(),
            );
        }

        if self.stream.segment_extensions.is_empty() && self.stream.manifest_extensions.is_empty()
        {
            warnings.push("no artifact extensions configured; cleanup will delete nothing".into());
        }

        if self.stream.default_frame_rate == 0 && !self.stream.require_frame_rate {
            warnings.push("stream.default_frame_rate is 0; starts without frame_rate will fail".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

/// Settings for the supervised stream process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Program to execute (name on `PATH` or absolute path).
    pub program: String,
    /// Argument template. `{source}`, `{resolution}`, `{scale}`,
    /// `{frame_rate}` and `{output_dir}` are substituted at start.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: BTreeMap<String, String>,
    /// Directory the child writes segments and manifests into.
    pub output_dir: PathBuf,
    /// Source address used when the caller supplies none.
    pub default_source: Option<String>,
    /// Resolution (preset key or `WxH`) used when the caller supplies none.
    pub default_resolution: Option<String>,
    /// Reject starts that carry no frame rate.
    pub require_frame_rate: bool,
    /// Frame rate used when not required and not supplied.
    pub default_frame_rate: u32,
    /// Seconds to wait after the graceful signal before force-killing.
    pub graceful_timeout_secs: u64,
    /// File extensions treated as media segments.
    pub segment_extensions: Vec<String>,
    /// File extensions treated as playlists/manifests.
    pub manifest_extensions: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            args: default_ffmpeg_args(),
            env: BTreeMap::new(),
            output_dir: PathBuf::from("/var/www/hls"),
            default_source: None,
            default_resolution: None,
            require_frame_rate: true,
            default_frame_rate: 30,
            graceful_timeout_secs: 10,
            segment_extensions: vec!["ts".into(), "m4s".into()],
            manifest_extensions: vec!["m3u8".into()],
        }
    }
}

/// SRT caller in, low-latency H.264 HLS out.
fn default_ffmpeg_args() -> Vec<String> {
    [
        "-hide_banner",
        "-i",
        "srt://{source}:1935?mode=caller",
        "-vf",
        "scale={scale}",
        "-r",
        "{frame_rate}",
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-tune",
        "zerolatency",
        "-c:a",
        "aac",
        "-f",
        "hls",
        "-hls_time",
        "2",
        "-hls_list_size",
        "6",
        "-hls_flags",
        "delete_segments",
        "{output_dir}/stream.m3u8",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_is_default() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.stream.program, "ffmpeg");
        assert_eq!(config.stream.graceful_timeout_secs, 10);
        assert!(config.stream.require_frame_rate);
        assert_eq!(config.stream.output_dir, PathBuf::from("/var/www/hls"));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [stream]
            program = "/bin/bash"
            args = ["measure.sh"]
            graceful_timeout_secs = 5

            [stream.env]
            STREAM_KEY = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.stream.program, "/bin/bash");
        assert_eq!(config.stream.args, vec!["measure.sh"]);
        assert_eq!(config.stream.graceful_timeout_secs, 5);
        assert_eq!(config.stream.env.get("STREAM_KEY").map(String::as_str), Some("abc"));
        assert_eq!(config.stream.manifest_extensions, vec!["m3u8"]);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = Config::from_toml("[server]\nport = \"not a number\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("SOURCE_IP", "10.0.0.9"),
            ("SCALE_VALUE", "720p"),
            ("HLS_PATH", "/tmp/hls"),
            ("STREAMGAUGE_PORT", "6001"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_with(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.stream.default_source.as_deref(), Some("10.0.0.9"));
        assert_eq!(config.stream.default_resolution.as_deref(), Some("720p"));
        assert_eq!(config.stream.output_dir, PathBuf::from("/tmp/hls"));
        assert_eq!(config.server.port, 6001);
    }

    #[test]
    fn blank_or_bad_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_with(|k| match k {
            "SOURCE_IP" => Some("   ".into()),
            "STREAMGAUGE_PORT" => Some("eighty".into()),
            _ => None,
        });

        assert!(config.stream.default_source.is_none());
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn validate_reports_warnings() {
        let mut config = Config::default();
        config.server.port = 0;
        config.stream.program = String::new();
        config.stream.graceful_timeout_secs = 0;
        config.stream.segment_extensions.clear();
        config.stream.manifest_extensions.clear();

        let warnings = config.validate();
        assert_eq!(warnings.len(), 4);
    }

    #[test]
    fn load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streamgauge.toml");
        std::fs::write(&path, "[stream]\noutput_dir = \"/srv/hls\"\n").unwrap();

        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.stream.output_dir, PathBuf::from("/srv/hls"));
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let err = Config::load_or_default(Some(Path::new("/nonexistent/streamgauge.toml")))
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
