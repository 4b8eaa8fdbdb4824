//! Stream control route handlers.
//!
//! Thin mappings onto [`sg_av::Supervisor`]; all state and validation live
//! there.

use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;
use sg_av::{StartedStream, StreamRequest, StreamStatus, TelemetrySnapshot};

use crate::context::AppContext;
use crate::error::AppError;

/// Body returned by a successful stop.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub state: &'static str,
}

/// Latest telemetry, or a marker when nothing has been published.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TelemetryResponse {
    Live(TelemetrySnapshot),
    Stopped { state: &'static str },
}

/// One entry of the preset table.
#[derive(Debug, Serialize)]
pub struct PresetEntry {
    pub key: &'static str,
    pub resolution: &'static str,
}

/// Preset table plus the resolution used when none is given.
#[derive(Debug, Serialize)]
pub struct PresetsResponse {
    pub presets: Vec<PresetEntry>,
    /// `None` when the configured default is unusable.
    pub default_resolution: Option<String>,
}

/// GET|POST /api/stream/start?resolution=&frame_rate=&source=
pub async fn start_stream(
    State(ctx): State<AppContext>,
    Query(request): Query<StreamRequest>,
) -> Result<Json<StartedStream>, AppError> {
    let started = ctx.supervisor.start(&request).await?;
    Ok(Json(started))
}

/// GET|POST /api/stream/stop
pub async fn stop_stream(State(ctx): State<AppContext>) -> Result<Json<StopResponse>, AppError> {
    ctx.supervisor.stop().await?;
    Ok(Json(StopResponse { state: "stopped" }))
}

/// GET /api/stream/status
pub async fn stream_status(State(ctx): State<AppContext>) -> Result<Json<StreamStatus>, AppError> {
    let status = ctx.supervisor.status().await?;
    Ok(Json(status))
}

/// GET /api/stream/telemetry
pub async fn latest_telemetry(State(ctx): State<AppContext>) -> Json<TelemetryResponse> {
    Json(match ctx.supervisor.latest_telemetry() {
        Some(snapshot) => TelemetryResponse::Live(snapshot),
        None => TelemetryResponse::Stopped { state: "stopped" },
    })
}

/// GET /api/stream/presets
pub async fn list_presets(State(ctx): State<AppContext>) -> Json<PresetsResponse> {
    let presets = sg_av::RESOLUTION_PRESETS
        .iter()
        .map(|&(key, resolution)| PresetEntry { key, resolution })
        .collect();

    let default_resolution = sg_av::default_resolution(&ctx.config.stream).ok();

    Json(PresetsResponse {
        presets,
        default_resolution,
    })
}
