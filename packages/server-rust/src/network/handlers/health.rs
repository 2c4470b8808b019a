//! Health, liveness and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Detailed status as JSON. Always 200; `state` tells whether the node is
/// actually serving.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();

    Json(json!({
        "state": health.as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "admission": {
            "capacity": state.gate.capacity(),
            "available": state.gate.available(),
        },
        "cache_backend": state.pipeline.cache().backend(),
        "peers": state.pipeline.peers().nodes().len(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness: the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness: 200 only while `Ready`, 503 during startup and drain.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::handlers::test_support::state_in;

    #[tokio::test]
    async fn health_reports_pipeline_and_gate() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), |config| {
            config.pool_size = 8;
            config.nodes = vec!["10.0.0.2:8070".into()];
        });
        state.shutdown.set_ready();
        let _permit = state.gate.acquire().await;
        let _guard = state.shutdown.in_flight_guard();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["state"], "ready");
        assert_eq!(json["in_flight"], 1);
        assert_eq!(json["admission"]["capacity"], 8);
        assert_eq!(json["admission"]["available"], 7);
        assert_eq!(json["cache_backend"], "filesystem");
        assert_eq!(json["peers"], 1);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_reports_draining() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), |_| {});
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();

        assert_eq!(health_handler(State(state)).await.0["state"], "draining");
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), |_| {});

        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);
        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
