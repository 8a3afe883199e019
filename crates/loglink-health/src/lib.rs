//! loglink health - liveness endpoint
//!
//! `GET /healthcheck` answers `ok` while the reconciliation loop is alive and
//! 503 once it has turned fatal. `GET /status` reports the loop status as JSON.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use loglink_core::{LoopState, LoopStatus};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Body of `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub healthy: bool,
    pub state: LoopState,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_reason: Option<String>,
    pub version: &'static str,
}

impl From<&LoopStatus> for StatusResponse {
    fn from(status: &LoopStatus) -> Self {
        Self {
            healthy: status.is_alive(),
            state: status.state,
            last_success: status.last_success,
            consecutive_failures: status.consecutive_failures,
            fatal_reason: status.fatal_reason.clone(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Shared handler state: a read-only view of the loop status
#[derive(Clone)]
pub struct HealthState {
    status: watch::Receiver<LoopStatus>,
}

impl HealthState {
    pub fn new(status: watch::Receiver<LoopStatus>) -> Self {
        Self { status }
    }

    fn snapshot(&self) -> LoopStatus {
        self.status.borrow().clone()
    }
}

pub fn create_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until the server fails
pub async fn serve(listener: TcpListener, state: HealthState) -> std::io::Result<()> {
    let app = create_router(state);
    axum::serve(listener, app).await
}

// === Handlers ===

async fn healthcheck(State(state): State<HealthState>) -> impl IntoResponse {
    let status = state.snapshot();
    if status.is_alive() {
        (StatusCode::OK, "ok")
    } else {
        debug!(reason = ?status.fatal_reason, "Reporting unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, "fatal")
    }
}

async fn status(State(state): State<HealthState>) -> impl IntoResponse {
    let status = state.snapshot();
    let code = if status.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(StatusResponse::from(&status)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn(status: LoopStatus) -> (String, watch::Sender<LoopStatus>) {
        let (tx, rx) = watch::channel(status);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, HealthState::new(rx)));
        (format!("http://{}", addr), tx)
    }

    #[tokio::test]
    async fn test_healthcheck_ok_while_alive() {
        let (base, tx) = spawn(LoopStatus::default()).await;

        for state in [LoopState::Idle, LoopState::Backoff, LoopState::Applying] {
            tx.send_modify(|s| s.state = state);
            let resp = reqwest::get(format!("{}/healthcheck", base)).await.unwrap();
            assert_eq!(resp.status(), reqwest::StatusCode::OK);
            assert_eq!(resp.text().await.unwrap(), "ok");
        }
    }

    #[tokio::test]
    async fn test_healthcheck_fails_once_fatal() {
        let (base, tx) = spawn(LoopStatus::default()).await;

        tx.send_modify(|s| {
            s.state = LoopState::Fatal;
            s.fatal_reason = Some("root unwritable".to_string());
        });

        let resp = reqwest::get(format!("{}/healthcheck", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_reports_loop() {
        let last_success = Utc::now();
        let (base, _tx) = spawn(LoopStatus {
            state: LoopState::Idle,
            last_success: Some(last_success),
            consecutive_failures: 0,
            fatal_reason: None,
        })
        .await;

        let resp = reqwest::get(format!("{}/status", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["state"], "idle");
        assert_eq!(body["healthy"], true);
        assert!(body.get("fatal_reason").is_none());

        let reported: DateTime<Utc> = serde_json::from_value(body["last_success"].clone()).unwrap();
        assert_eq!(reported, last_success);
    }
}
