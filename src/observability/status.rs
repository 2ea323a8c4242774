//! Check status endpoint.
//!
//! - `GET /status`: version and aggregate counts
//! - `GET /checks`: every check
//! - `GET /checks/healthy`, `GET /checks/unhealthy`: one side of the partition

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::health::{Check, CheckSnapshot, Monitor};
use crate::lifecycle::shutdown_requested;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub checks: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

pub fn status_router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/checks", get(get_checks))
        .route("/checks/healthy", get(get_healthy))
        .route("/checks/unhealthy", get(get_unhealthy))
        .layer(TraceLayer::new_for_http())
        .with_state(monitor)
}

/// Serve the status endpoint until shutdown.
pub async fn serve_status(
    addr: SocketAddr,
    monitor: Arc<Monitor>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Status endpoint listening");

    axum::serve(listener, status_router(monitor))
        .with_graceful_shutdown(async move {
            shutdown_requested(&mut shutdown).await;
        })
        .await
}

async fn get_status(State(monitor): State<Arc<Monitor>>) -> Json<SystemStatus> {
    let healthy = monitor.healthy().len();
    let unhealthy = monitor.unhealthy().len();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        checks: healthy + unhealthy,
        healthy,
        unhealthy,
    })
}

async fn get_checks(State(monitor): State<Arc<Monitor>>) -> Json<Vec<CheckSnapshot>> {
    Json(monitor.snapshot())
}

async fn get_healthy(State(monitor): State<Arc<Monitor>>) -> Json<Vec<CheckSnapshot>> {
    Json(sorted(monitor.healthy()))
}

async fn get_unhealthy(State(monitor): State<Arc<Monitor>>) -> Json<Vec<CheckSnapshot>> {
    Json(sorted(monitor.unhealthy()))
}

fn sorted(checks: Vec<Arc<Check>>) -> Vec<CheckSnapshot> {
    let mut snapshots: Vec<CheckSnapshot> = checks.iter().map(|c| c.snapshot()).collect();
    snapshots.sort_by(|a, b| a.id.cmp(&b.id));
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Status;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn monitor() -> Arc<Monitor> {
        let monitor = Monitor::default();
        let up = Check::new("up");
        up.update_status(Status::Healthy, None);
        monitor.add_check(up);
        let down = Check::new("down");
        down.update_status(Status::Sickly, None);
        monitor.add_check(down);
        Arc::new(monitor)
    }

    async fn get_json(uri: &str) -> serde_json::Value {
        let response = status_router(monitor())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_counts() {
        let body = get_json("/status").await;
        assert_eq!(body["checks"], 2);
        assert_eq!(body["healthy"], 1);
        assert_eq!(body["unhealthy"], 1);
    }

    #[tokio::test]
    async fn test_check_lists() {
        let all = get_json("/checks").await;
        assert_eq!(all[0]["id"], "down");
        assert_eq!(all[0]["status"], "FAILED");
        assert_eq!(all[1]["id"], "up");

        let unhealthy = get_json("/checks/unhealthy").await;
        assert_eq!(unhealthy.as_array().unwrap().len(), 1);
        assert_eq!(unhealthy[0]["id"], "down");

        let healthy = get_json("/checks/healthy").await;
        assert_eq!(healthy[0]["status"], "HEALTHY");
    }
}
