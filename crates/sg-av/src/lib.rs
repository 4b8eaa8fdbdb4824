//! # sg-av
//!
//! Supervision of an external streaming process for streamgauge.
//!
//! This crate provides:
//!
//! - **Parameter resolution** ([`resolve_parameters`]) -- preset lookup and
//!   defaults for resolution, frame rate and source address.
//! - **Command templates** ([`TemplateContext`]) -- `{placeholder}`
//!   expansion of the configured argument vector.
//! - **Process supervision** ([`Supervisor`]) -- one child at a time, graceful
//!   stop with forced-kill escalation, lazy crash detection.
//! - **Telemetry** ([`TelemetryMonitor`], [`parse_line`]) -- live progress
//!   parsed from the child's stderr.
//! - **Artifact cleanup** ([`ArtifactReclaimer`]) -- removal of segments and
//!   manifests left in the output directory.
//! - **Tool discovery** ([`ToolRegistry`]) -- availability of the configured
//!   program, ffmpeg and ffprobe.

pub mod command;
pub mod params;
pub mod reclaim;
pub mod supervisor;
pub mod telemetry;
pub mod template;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{SpawnedProcess, StreamCommand};
pub use params::{
    default_resolution, preset, preset_keys, resolve_parameters, validate_defaults, StreamParams,
    StreamRequest, RESOLUTION_PRESETS,
};
pub use reclaim::{ArtifactReclaimer, ReclaimReport};
pub use supervisor::{SessionState, StartedStream, StreamStatus, Supervisor};
pub use telemetry::{
    is_progress_line, parse_line, MetricValue, MonitorHandle, TelemetryMonitor, TelemetrySnapshot,
};
pub use template::TemplateContext;
pub use tools::{ToolInfo, ToolRegistry};
