//! Axum router construction.

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route(
            "/stream/start",
            get(routes::stream::start_stream).post(routes::stream::start_stream),
        )
        .route(
            "/stream/stop",
            get(routes::stream::stop_stream).post(routes::stream::stop_stream),
        )
        .route("/stream/status", get(routes::stream::stream_status))
        .route("/stream/telemetry", get(routes::stream::latest_telemetry))
        .route("/stream/presets", get(routes::stream::list_presets));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
