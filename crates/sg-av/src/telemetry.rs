//! Live progress telemetry parsed from the stream process's stderr.
//!
//! ffmpeg rewrites a single stats line in place using carriage returns:
//!
//! ```text
//! frame=  123 fps= 30 q=28.0 size=    1024kB time=00:00:04.10 bitrate=2046.2kbits/s speed=1.01x
//! ```
//!
//! [`parse_line`] turns such a line into a metric map, and
//! [`TelemetryMonitor`] runs the read loop as a cancellable task that
//! publishes each parsed line as the latest [`TelemetrySnapshot`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;

/// Lines longer than this are dropped.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Minimum gap between progress summaries in the log.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Unit suffixes stripped before numeric coercion. Longest first.
const UNIT_SUFFIXES: &[&str] = &["kbits/s", "KiB", "kB", "x"];

static METRIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)=\s*(\S+)").expect("metric pattern is valid"));

/// A single metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric value, if this metric parsed as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }
}

/// The most recent progress reading from the stream process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Metric name to value, e.g. `frame`, `fps`, `bitrate`, `speed`, `time`.
    pub metrics: BTreeMap<String, MetricValue>,
    /// Wall-clock time the line was parsed.
    pub captured_at: DateTime<Utc>,
}

impl TelemetrySnapshot {
    /// Snapshot of `metrics` captured now.
    pub fn now(metrics: BTreeMap<String, MetricValue>) -> Self {
        Self {
            metrics,
            captured_at: Utc::now(),
        }
    }

    /// Look up a metric by name.
    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.metrics.get(key)
    }

    /// Look up a numeric metric by name.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetricValue::as_f64)
    }
}

/// Publishing side of the snapshot channel. `None` means no active session.
pub type TelemetrySender = Arc<watch::Sender<Option<TelemetrySnapshot>>>;

/// Whether `line` is a progress line (carries both a frame count and a rate).
pub fn is_progress_line(line: &str) -> bool {
    line.contains("frame=") && line.contains("fps=")
}

/// Parse `key=value` tokens out of a line.
///
/// Values are coerced to numbers after stripping a known unit suffix
/// (`kbits/s`, `kB`, `KiB`, `x`); anything else, including `N/A` and
/// timestamps, is kept as text. Never fails: a line without tokens yields an
/// empty map.
pub fn parse_line(line: &str) -> BTreeMap<String, MetricValue> {
    METRIC_RE
        .captures_iter(line)
        .map(|caps| (caps[1].to_string(), parse_value(&caps[2])))
        .collect()
}

fn parse_value(raw: &str) -> MetricValue {
    let trimmed = raw.trim();
    let numeric = UNIT_SUFFIXES
        .iter()
        .find_map(|suffix| trimmed.strip_suffix(suffix))
        .unwrap_or(trimmed);

    match numeric.parse::<f64>() {
        Ok(n) if n.is_finite() => MetricValue::Number(n),
        _ => MetricValue::Text(trimmed.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Line framing
// ---------------------------------------------------------------------------

/// Frames a byte stream into lines ending at `\n` or `\r`.
///
/// Lines longer than [`MAX_LINE_BYTES`] are reported as an error and skipped
/// up to the next terminator.
fn line_frames<R: AsyncRead>(reader: R) -> FramedRead<R, AnyDelimiterCodec> {
    FramedRead::new(
        reader,
        AnyDelimiterCodec::new_with_max_length(b"\r\n".to_vec(), Vec::new(), MAX_LINE_BYTES),
    )
}

// ---------------------------------------------------------------------------
// Monitor task
// ---------------------------------------------------------------------------

/// Background consumer of the stream process's diagnostic output.
pub struct TelemetryMonitor;

impl TelemetryMonitor {
    /// Spawn the read loop on the current tokio runtime.
    ///
    /// Each progress line replaces the snapshot held by `publisher`. The
    /// task ends when `reader` closes or the returned handle is shut down;
    /// it never clears the snapshot itself.
    pub fn spawn<R>(reader: R, publisher: TelemetrySender, label: impl Into<String>) -> MonitorHandle
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let label = label.into();
        let cancel = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(
            line_frames(reader),
            publisher,
            label,
            cancel.clone(),
            stopped.clone(),
        ));

        MonitorHandle {
            task: Some(task),
            cancel,
            stopped,
        }
    }
}

async fn run<R>(
    mut lines: FramedRead<R, AnyDelimiterCodec>,
    publisher: TelemetrySender,
    label: String,
    cancel: CancellationToken,
    stopped: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut last_logged: Option<Instant> = None;
    // A framing error ends the stream once; polling again resumes reading.
    let mut resume = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(label = %label, "Telemetry monitor cancelled");
                break;
            }
            next = lines.next() => next,
        };

        match next {
            Some(Ok(frame)) => {
                resume = false;
                handle_line(&String::from_utf8_lossy(&frame), &publisher, &label, &mut last_logged);
            }
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                tracing::debug!(label = %label, max_bytes = MAX_LINE_BYTES, "Skipping over-long line");
                resume = true;
            }
            Some(Err(AnyDelimiterCodecError::Io(e))) => {
                tracing::warn!(label = %label, error = %e, "Failed to read diagnostic stream");
                break;
            }
            None if resume => resume = false,
            None => {
                tracing::debug!(label = %label, "Diagnostic stream closed");
                break;
            }
        }
    }

    stopped.store(true, Ordering::SeqCst);
}

fn handle_line(
    line: &str,
    publisher: &TelemetrySender,
    label: &str,
    last_logged: &mut Option<Instant>,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if !is_progress_line(line) {
        tracing::debug!(label = %label, "{line}");
        return;
    }

    let metrics = parse_line(line);
    if metrics.is_empty() {
        return;
    }

    let snapshot = TelemetrySnapshot::now(metrics);

    if last_logged.map_or(true, |t| t.elapsed() >= PROGRESS_LOG_INTERVAL) {
        tracing::info!(
            label = %label,
            frame = ?snapshot.number("frame"),
            fps = ?snapshot.number("fps"),
            bitrate_kbps = ?snapshot.number("bitrate"),
            speed = ?snapshot.number("speed"),
            "Stream progress"
        );
        *last_logged = Some(Instant::now());
    }

    publisher.send_replace(Some(snapshot));
}

/// Owner of a running monitor task. Dropping it cancels the task.
#[derive(Debug)]
pub struct MonitorHandle {
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    stopped: Arc<AtomicBool>,
}

impl MonitorHandle {
    /// Whether the read loop is still active.
    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Cancel the read loop and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Telemetry monitor task failed");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
