//! Operator endpoints on a separate listener
//!
//! Keeps `/health` and `/metrics` off the public listener, where every
//! unmatched path must answer with the placeholder (or 401 without a token).
//! Bind it to loopback or a cluster-internal address.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use cloudshell_auth::{IdentityKey, TokenStore};
use metrics_exporter_prometheus::PrometheusHandle;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub started_at: Instant,
    pub prometheus: PrometheusHandle,
    pub store: Arc<dyn TokenStore>,
    pub identity: Arc<dyn IdentityKey>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// GET /health: liveness plus the active store and identity strategy.
async fn health_handler(State(state): State<AdminState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "status": "healthy",
            "token_store": state.store.id(),
            "identity": state.identity.id(),
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        })),
    )
}

/// GET /metrics: Prometheus text exposition format.
async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use cloudshell_auth::{MemoryTokenStore, SharedIdentity};
    use tower::ServiceExt;

    fn test_admin_state() -> AdminState {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        AdminState {
            started_at: Instant::now(),
            prometheus: recorder.handle(),
            store: Arc::new(MemoryTokenStore::new()),
            identity: Arc::new(SharedIdentity),
        }
    }

    #[tokio::test]
    async fn health_reports_backend_and_identity() {
        let app = build_admin_router(test_admin_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["token_store"], "memory");
        assert_eq!(json["identity"], "shared");
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let app = build_admin_router(test_admin_state());
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
