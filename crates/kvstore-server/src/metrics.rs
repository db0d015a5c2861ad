use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use kvstore_node::NodeRuntime;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

/// Observability endpoint (§10.3): `/healthz` for liveness, `/status` for
/// role/term/lag. Deliberately separate from the client and replication
/// TCP ports — an operator polling this should never contend with the wire
/// protocols it is reporting on.
pub fn build_router(node: Arc<NodeRuntime>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(node)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(node): State<Arc<NodeRuntime>>) -> Json<kvstore_node::NodeStatus> {
    Json(node.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use kvstore_node::NodeConfig;
    use kvstore_types::NodeId;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn healthz_returns_ok() {
        let dir = tempdir().unwrap();
        let node = NodeRuntime::open(NodeConfig {
            node_id: NodeId::new(0),
            initial_primary: true,
            data_dir: dir.path().to_path_buf(),
            ..NodeConfig::default()
        })
        .unwrap();
        let app = build_router(node);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn status_reports_role() {
        let dir = tempdir().unwrap();
        let node = NodeRuntime::open(NodeConfig {
            node_id: NodeId::new(0),
            initial_primary: true,
            data_dir: dir.path().to_path_buf(),
            ..NodeConfig::default()
        })
        .unwrap();
        let app = build_router(node);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["role"], "PRIMARY");
    }
}
