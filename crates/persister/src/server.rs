//! HTTP server for health, readiness, and metrics endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::metrics::encode_metrics;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub subject: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stored_secs_ago: Option<u64>,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub subject: String,
    pub connected: Arc<AtomicBool>,
    /// Unix timestamp (seconds) of last successful write, 0 if none
    pub last_stored_epoch_secs: Arc<AtomicU64>,
}

impl ServerState {
    pub fn new(
        subject: impl Into<String>,
        connected: Arc<AtomicBool>,
        last_stored_epoch_secs: Arc<AtomicU64>,
    ) -> Self {
        Self {
            subject: subject.into(),
            connected,
            last_stored_epoch_secs,
        }
    }

    fn last_stored_secs_ago(&self) -> Option<u64> {
        let last = self.last_stored_epoch_secs.load(Ordering::SeqCst);
        if last == 0 {
            return None;
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Some(now.saturating_sub(last))
    }

    fn response(&self, status: &str) -> HealthResponse {
        HealthResponse {
            status: status.to_string(),
            subject: self.subject.clone(),
            connected: self.connected.load(Ordering::SeqCst),
            last_stored_secs_ago: self.last_stored_secs_ago(),
        }
    }
}

/// Health endpoint - 200 while the process is serving. An idle queue is
/// not a failure.
async fn health(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(state.response("ok")))
}

/// Ready endpoint - returns 200 only when connected to NATS
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    if state.connected.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(state.response("ready")))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(state.response("not_connected")),
        )
    }
}

/// Metrics endpoint - returns Prometheus text format
async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server until `shutdown` fires
pub async fn run_server(
    addr: SocketAddr,
    state: ServerState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state(connected: bool, last_stored: u64) -> ServerState {
        ServerState::new(
            "contentSubject",
            Arc::new(AtomicBool::new(connected)),
            Arc::new(AtomicU64::new(last_stored)),
        )
    }

    async fn get_status(state: ServerState, uri: &str) -> StatusCode {
        create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_ok_when_nothing_stored_yet() {
        let status = get_status(create_test_state(true, 0), "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ok_when_disconnected() {
        let status = get_status(create_test_state(false, 0), "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_when_connected() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let status = get_status(create_test_state(true, now), "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_when_disconnected() {
        let status = get_status(create_test_state(false, 0), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_last_stored_secs_ago() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let state = create_test_state(true, now - 30);
        let ago = state.last_stored_secs_ago().unwrap();
        assert!((30..=31).contains(&ago));
        assert!(create_test_state(true, 0).last_stored_secs_ago().is_none());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let response = create_router(create_test_state(true, 0))
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));
    }
}
