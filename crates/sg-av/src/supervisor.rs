//! Lifecycle of the single supervised stream process.
//!
//! A [`Supervisor`] owns at most one child at a time. Every lifecycle
//! operation runs under one async mutex so transitions are linearizable.
//! Teardown (termination, monitor join, artifact reclaim) runs on its own
//! task holding that lock, so it completes even if the caller goes away.
//! The lifecycle state and telemetry are published through `watch`
//! channels and read without taking the lock.

use std::collections::BTreeMap;
use std::future::Future;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sg_core::config::StreamConfig;
use sg_core::{Error, Result};
use tokio::process::Child;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};

use crate::command::StreamCommand;
use crate::params::{resolve_parameters, StreamParams, StreamRequest};
use crate::reclaim::{ArtifactReclaimer, ReclaimReport};
use crate::telemetry::{MonitorHandle, TelemetryMonitor, TelemetrySender, TelemetrySnapshot};
use crate::template::TemplateContext;

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Crashed,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedStream {
    pub pid: u32,
    pub resolution: String,
    pub frame_rate: u32,
    pub source: String,
    pub started_at: DateTime<Utc>,
}

/// Answer to a status poll.
///
/// `Crashed` is reported exactly once, by the poll that notices the exit;
/// the session is already back to idle when it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum StreamStatus {
    Stopped,
    Running {
        pid: u32,
        parameters: StreamParams,
        started_at: DateTime<Utc>,
        /// Whether the diagnostic stream is still being read.
        monitoring: bool,
    },
    Crashed {
        pid: u32,
        exit_code: Option<i32>,
    },
}

struct ActiveStream {
    child: Child,
    pid: u32,
    params: StreamParams,
    started_at: DateTime<Utc>,
    monitor: MonitorHandle,
}

type SessionGuard = OwnedMutexGuard<Option<ActiveStream>>;

/// State shared with detached teardown tasks.
struct Shared {
    config: StreamConfig,
    phase: watch::Sender<SessionState>,
    telemetry: TelemetrySender,
}

/// Supervises one external stream process.
pub struct Supervisor {
    shared: Arc<Shared>,
    session: Arc<Mutex<Option<ActiveStream>>>,
}

impl Supervisor {
    pub fn new(config: StreamConfig) -> Self {
        let (phase, _) = watch::channel(SessionState::Idle);
        let (telemetry, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                config,
                phase,
                telemetry: Arc::new(telemetry),
            }),
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// The stream configuration this supervisor was built with.
    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// Current lifecycle state. Does not wait for lifecycle operations, so
    /// `Stopping` is visible while a stop is in flight.
    pub fn state(&self) -> SessionState {
        *self.shared.phase.borrow()
    }

    async fn lock(&self) -> SessionGuard {
        Arc::clone(&self.session).lock_owned().await
    }

    /// Resolve `request` and spawn the stream process.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] if a stream is active, whatever the request.
    /// - Resolver errors for unusable parameters.
    /// - [`Error::SpawnFailed`] if the program cannot be executed.
    ///
    /// The session is idle again after any error.
    pub async fn start(&self, request: &StreamRequest) -> Result<StartedStream> {
        let mut session = self.lock().await;

        let exited = match session.as_mut() {
            Some(active) => match active.child.try_wait()? {
                None => return Err(Error::AlreadyRunning { pid: active.pid }),
                Some(exit) => {
                    tracing::warn!(
                        pid = active.pid,
                        exit_code = ?exit.code(),
                        "Previous stream process had exited"
                    );
                    true
                }
            },
            None => false,
        };

        if exited {
            // Exited without a status poll noticing; reap it first.
            let shared = Arc::clone(&self.shared);
            session = detached(async move {
                if let Some(active) = session.take() {
                    shared.end_session(active.monitor).await;
                }
                shared.set_phase(SessionState::Idle);
                session
            })
            .await?;
        }

        let output_dir = &self.shared.config.output_dir;
        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            tracing::warn!(dir = %output_dir.display(), error = %e, "Failed to create output directory");
        }

        self.shared.set_phase(SessionState::Starting);

        match self.shared.launch(request) {
            Ok(active) => {
                let started = StartedStream {
                    pid: active.pid,
                    resolution: active.params.resolution.clone(),
                    frame_rate: active.params.frame_rate,
                    source: active.params.source.clone(),
                    started_at: active.started_at,
                };
                tracing::info!(
                    pid = started.pid,
                    resolution = %started.resolution,
                    frame_rate = started.frame_rate,
                    source = %started.source,
                    "Stream started"
                );
                *session = Some(active);
                self.shared.set_phase(SessionState::Running);
                Ok(started)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stream start failed");
                self.shared.set_phase(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Stop the active stream, escalating to a forced kill after the
    /// graceful timeout, then reclaim its artifacts.
    ///
    /// Once begun, the stop runs to completion even if the returned future
    /// is dropped.
    ///
    /// # Errors
    ///
    /// [`Error::NotRunning`] if no stream is active, including one that has
    /// exited on its own; the next [`status`](Self::status) reports that exit.
    pub async fn stop(&self) -> Result<()> {
        let mut session = self.lock().await;

        let Some(active) = session.as_mut() else {
            return Err(Error::NotRunning);
        };
        if let Some(exit) = active.child.try_wait()? {
            tracing::debug!(pid = active.pid, exit_code = ?exit.code(), "Stop requested after stream exited");
            return Err(Error::NotRunning);
        }

        self.shared.set_phase(SessionState::Stopping);

        let shared = Arc::clone(&self.shared);
        detached(async move {
            if let Some(active) = session.take() {
                let pid = active.pid;
                let exit = shared.terminate(active).await;
                tracing::info!(pid, exit_code = ?exit.and_then(|s| s.code()), "Stream stopped");
            }
            shared.set_phase(SessionState::Idle);
        })
        .await
    }

    /// Poll the active stream without blocking on it.
    ///
    /// If the process has exited, the session is torn down, artifacts are
    /// reclaimed and a one-shot [`StreamStatus::Crashed`] is returned.
    pub async fn status(&self) -> Result<StreamStatus> {
        let mut session = self.lock().await;

        let Some(active) = session.as_mut() else {
            return Ok(StreamStatus::Stopped);
        };

        let Some(exit) = active.child.try_wait()? else {
            return Ok(StreamStatus::Running {
                pid: active.pid,
                parameters: active.params.clone(),
                started_at: active.started_at,
                monitoring: active.monitor.is_running(),
            });
        };

        let pid = active.pid;
        tracing::warn!(pid, exit_code = ?exit.code(), "Stream process exited unexpectedly");
        self.shared.set_phase(SessionState::Crashed);

        let shared = Arc::clone(&self.shared);
        detached(async move {
            if let Some(active) = session.take() {
                shared.end_session(active.monitor).await;
            }
            shared.set_phase(SessionState::Idle);
        })
        .await?;

        Ok(StreamStatus::Crashed {
            pid,
            exit_code: exit.code(),
        })
    }

    /// Latest parsed progress. `None` when no stream is active; an empty
    /// snapshot while a stream runs but has not reported progress yet.
    /// Does not wait for lifecycle operations.
    pub fn latest_telemetry(&self) -> Option<TelemetrySnapshot> {
        self.shared.telemetry.borrow().clone()
    }

    /// Stop the active stream, if any. Used on server shutdown.
    pub async fn shutdown(&self) {
        let result = match self.stop().await {
            // An exited child still needs its session torn down.
            Err(Error::NotRunning) => self.status().await.map(|_| ()),
            other => other,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to stop stream during shutdown");
        }
    }
}

impl Shared {
    fn set_phase(&self, state: SessionState) {
        self.phase.send_replace(state);
    }

    fn reclaimer(&self) -> ArtifactReclaimer {
        ArtifactReclaimer::from_config(&self.config)
    }

    fn launch(&self, request: &StreamRequest) -> Result<ActiveStream> {
        let params = resolve_parameters(request, &self.config)?;
        let output_dir = &self.config.output_dir;

        let ctx = TemplateContext::for_stream(&params, output_dir);
        let mut command = StreamCommand::new(ctx.substitute(&self.config.program));
        command.args(ctx.substitute_all(&self.config.args));
        for (key, value) in &self.config.env {
            command.env(key, ctx.substitute(value));
        }
        command
            .env("SOURCE_IP", &params.source)
            .env("SCALE_VALUE", params.scale())
            .env("RESOLUTION", &params.resolution)
            .env("FRAME_RATE", params.frame_rate.to_string())
            .env("HLS_PATH", output_dir.display().to_string());

        tracing::debug!(command = %command.display(), "Spawning stream process");
        let spawned = command.spawn()?;

        self.telemetry
            .send_replace(Some(TelemetrySnapshot::now(BTreeMap::new())));
        let monitor = TelemetryMonitor::spawn(
            spawned.stderr,
            self.telemetry.clone(),
            format!("stream[{}]", spawned.pid),
        );

        Ok(ActiveStream {
            child: spawned.child,
            pid: spawned.pid,
            params,
            started_at: Utc::now(),
            monitor,
        })
    }

    /// Signal, wait, escalate, then tear the session down.
    async fn terminate(&self, mut active: ActiveStream) -> Option<ExitStatus> {
        let pid = active.pid;
        let graceful = Duration::from_secs(self.config.graceful_timeout_secs);

        let mut exit = None;
        if signal_graceful(pid) {
            match tokio::time::timeout(graceful, active.child.wait()).await {
                Ok(Ok(status)) => exit = Some(status),
                Ok(Err(e)) => {
                    tracing::warn!(pid, error = %e, "Failed waiting for stream process");
                }
                Err(_) => {
                    tracing::warn!(
                        pid,
                        timeout_secs = self.config.graceful_timeout_secs,
                        "Stream process ignored graceful stop; killing"
                    );
                }
            }
        }

        if exit.is_none() {
            exit = force_kill(&mut active.child, pid).await;
        }

        self.end_session(active.monitor).await;
        exit
    }

    /// Join the monitor, clear the published snapshot and reclaim artifacts.
    async fn end_session(&self, monitor: MonitorHandle) -> ReclaimReport {
        monitor.shutdown().await;
        self.telemetry.send_replace(None);

        let reclaimer = self.reclaimer();
        match tokio::task::spawn_blocking(move || reclaimer.reclaim()).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Artifact reclaim task failed");
                ReclaimReport::default()
            }
        }
    }
}

/// Run `teardown` on its own task and wait for it. Dropping the returned
/// future detaches the task instead of cancelling it.
async fn detached<F>(teardown: F) -> Result<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(teardown)
        .await
        .map_err(|e| Error::Internal(format!("Teardown task failed: {e}")))
}

/// Send the graceful stop signal. `false` means go straight to a kill.
#[cfg(unix)]
fn signal_graceful(pid: u32) -> bool {
    match crate::command::signal_graceful(pid) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(pid, error = %e, "Failed to signal stream process");
            false
        }
    }
}

#[cfg(not(unix))]
fn signal_graceful(_pid: u32) -> bool {
    false
}

async fn force_kill(child: &mut Child, pid: u32) -> Option<ExitStatus> {
    #[cfg(unix)]
    let killed = crate::command::signal_kill(pid);
    #[cfg(not(unix))]
    let killed = child.start_kill();

    if let Err(e) = killed {
        tracing::warn!(pid, error = %e, "Failed to kill stream process");
    }

    match child.wait().await {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(pid, error = %e, "Failed to reap stream process");
            None
        }
    }
}
