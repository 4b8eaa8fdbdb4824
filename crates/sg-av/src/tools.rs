//! Discovery of the stream program and companion tools.
//!
//! The [`ToolRegistry`] resolves the configured stream program plus ffmpeg
//! and ffprobe, and reports their availability for `check-tools`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};

/// Tools always reported alongside the configured program.
const COMPANION_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name as configured.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of version output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding resolved tool locations.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    names: Vec<String>,
    tools: BTreeMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Resolve the configured program and the companion tools.
    ///
    /// A program given as a path is used if it exists; a bare name is looked
    /// up with [`which::which`]. Tools that are not found are omitted.
    pub fn discover(config: &sg_core::config::StreamConfig) -> Self {
        let mut names = vec![config.program.clone()];
        for tool in COMPANION_TOOLS {
            if !names.iter().any(|n| n == tool) {
                names.push(tool.to_string());
            }
        }

        let tools = names
            .iter()
            .filter_map(|name| resolve(name).map(|path| (name.clone(), path)))
            .collect();

        Self { names, tools }
    }

    /// Path of a discovered tool, or [`sg_core::Error::SpawnFailed`] if it
    /// was not found.
    pub fn require(&self, name: &str) -> sg_core::Result<&Path> {
        self.tools.get(name).map(PathBuf::as_path).ok_or_else(|| {
            sg_core::Error::spawn_failed(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Check every tool and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        self.names
            .iter()
            .map(|name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.clone(),
                    available: true,
                    version: detect_version(name, path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: name.clone(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

fn resolve(name: &str) -> Option<PathBuf> {
    if name.trim().is_empty() {
        return None;
    }

    let path = Path::new(name);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    which::which(name).ok()
}

/// Run `<tool> -version` (ffmpeg family) or `<tool> --version` and return
/// the first line of stdout.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    let version_arg = match stem {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .stdin(Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
