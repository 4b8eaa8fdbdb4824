//! sg-server: HTTP API over the stream supervisor.
//!
//! This crate wraps a [`sg_av::Supervisor`] in an axum router. It provides:
//!
//! - Routes for starting, stopping and polling the stream
//! - Telemetry and preset listing
//! - Graceful shutdown that stops any active stream before returning

pub mod context;
pub mod error;
pub mod router;
pub mod routes;

use std::net::SocketAddr;

use sg_core::config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the streamgauge server.
///
/// Validates the configuration, reports tool availability, binds the
/// configured address and serves until a shutdown signal is received.
pub async fn start(config: Config) -> sg_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }
    for problem in sg_av::validate_defaults(&config.stream) {
        tracing::warn!("Config warning: {problem}");
    }

    let tools = sg_av::ToolRegistry::discover(&config.stream);
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else if info.name == config.stream.program {
            tracing::warn!("Stream program not found: {}", info.name);
        } else {
            tracing::debug!("Tool not found: {}", info.name);
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| sg_core::Error::Config(format!("Invalid server address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| sg_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Starting server on {addr}");

    let ctx = AppContext::new(config);
    serve(listener, ctx, CancellationToken::new()).await
}

/// Serve the API on an already-bound listener until a signal arrives or
/// `cancel` fires, then stop the active stream.
pub async fn serve(
    listener: TcpListener,
    ctx: AppContext,
    cancel: CancellationToken,
) -> sg_core::Result<()> {
    let app = router::build_router(ctx.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    ctx.supervisor.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn serve_returns_after_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ctx = AppContext::new(Config::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(serve(listener, ctx, cancel.clone()));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server stopped")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn start_rejects_bad_host() {
        let mut config = Config::default();
        config.server.host = "not a host".into();
        let err = start(config).await.unwrap_err();
        assert!(matches!(err, sg_core::Error::Config(_)));
    }
}
