//! Error-to-HTTP response conversion.
//!
//! Wraps [`sg_core::Error`] so route handlers can return
//! `Result<T, AppError>` and use `?` on supervisor calls.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: sg_core::Error,
}

impl AppError {
    pub fn new(inner: sg_core::Error) -> Self {
        Self { inner }
    }
}

impl From<sg_core::Error> for AppError {
    fn from(e: sg_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let mut body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
        });

        if let sg_core::Error::InvalidParameter { allowed, .. } = &self.inner {
            if !allowed.is_empty() {
                body["allowed"] = json!(allowed);
            }
        }

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn already_running_produces_409() {
        let response = AppError::new(sg_core::Error::AlreadyRunning { pid: 7 }).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], "already_running");
        assert!(body.get("allowed").is_none());
    }

    #[tokio::test]
    async fn invalid_parameter_lists_allowed_values() {
        let err = sg_core::Error::invalid("resolution", "bad", vec!["720p".into(), "1080p".into()]);
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["allowed"], json!(["720p", "1080p"]));
    }

    #[test]
    fn spawn_failure_produces_502() {
        let response =
            AppError::new(sg_core::Error::spawn_failed("ffmpeg", "not found")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
