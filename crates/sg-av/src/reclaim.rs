//! Removal of stale segment and manifest files from the output directory.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Outcome of a reclaim pass.
#[derive(Debug, Default, Clone)]
pub struct ReclaimReport {
    /// Files that were removed.
    pub deleted: Vec<PathBuf>,
    /// Entries that matched but could not be removed, with the error text.
    pub failed: Vec<(PathBuf, String)>,
}

impl ReclaimReport {
    /// Whether every matching entry was removed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes artifacts with known extensions from a single directory.
///
/// Only the top level of the directory is scanned. Matching is on the file
/// extension, case-insensitively.
#[derive(Debug, Clone)]
pub struct ArtifactReclaimer {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl ArtifactReclaimer {
    /// Create a reclaimer for `dir` matching `extensions` (without dots).
    pub fn new(
        dir: impl Into<PathBuf>,
        extensions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            dir: dir.into(),
            extensions: extensions
                .into_iter()
                .map(|e| {
                    let e: String = e.into();
                    e.trim_start_matches('.').to_ascii_lowercase()
                })
                .collect(),
        }
    }

    /// Reclaimer covering the configured segment and manifest extensions.
    pub fn from_config(config: &sg_core::config::StreamConfig) -> Self {
        Self::new(
            config.output_dir.clone(),
            config
                .segment_extensions
                .iter()
                .chain(config.manifest_extensions.iter())
                .cloned(),
        )
    }

    /// The directory being cleaned.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }

    /// Delete every matching entry, continuing past individual failures.
    ///
    /// A missing directory is not an error; it yields an empty report.
    pub fn reclaim(&self) -> ReclaimReport {
        let mut report = ReclaimReport::default();

        if !self.dir.is_dir() {
            tracing::info!(dir = %self.dir.display(), "Output directory absent; nothing to reclaim");
            return report;
        }

        let entries = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to list output directory entry");
                    continue;
                }
            };

            let path = entry.path();
            if !self.matches(path) {
                continue;
            }

            match std::fs::remove_file(path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed artifact");
                    report.deleted.push(path.to_path_buf());
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove artifact");
                    report.failed.push((path.to_path_buf(), e.to_string()));
                }
            }
        }

        if report.is_complete() {
            tracing::info!(
                dir = %self.dir.display(),
                deleted = report.deleted.len(),
                "Reclaimed stream artifacts"
            );
        } else {
            tracing::warn!(
                dir = %self.dir.display(),
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "Artifact reclaim incomplete"
            );
        }

        report
    }
}
