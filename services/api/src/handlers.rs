//! Axum Handlers for the HTTP surface next to the WebSocket endpoint.

use crate::state::AppState;
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
}

/// Liveness check reporting the number of connected clients.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.sessions.len().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionRegistry;
    use crate::ws::{client_session::ClientSession, relay::RelaySettings};
    use async_trait::async_trait;
    use cubby_core::inactivity::InactivityPolicy;
    use cubby_core::{ToolRegistry, UpstreamConnector, UpstreamError, UpstreamSession};
    use tokio::sync::mpsc;
    use tokio_util::task::TaskTracker;
    use uuid::Uuid;

    struct OfflineConnector;

    #[async_trait]
    impl UpstreamConnector for OfflineConnector {
        async fn connect(&self) -> Result<UpstreamSession, UpstreamError> {
            Err(UpstreamError::Connect("offline".into()))
        }
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            connector: Arc::new(OfflineConnector),
            tools: Arc::new(ToolRegistry::new()),
            settings: RelaySettings::new(16000, InactivityPolicy::from_secs(30, 60).unwrap()),
            sessions: SessionRegistry::new(),
            connections: TaskTracker::new(),
        })
    }

    #[tokio::test]
    async fn test_health_counts_active_sessions() {
        let state = state();
        let Json(body) = health(State(state.clone())).await;
        assert_eq!(
            body,
            HealthResponse {
                status: "ok",
                active_sessions: 0
            }
        );

        let (tx, _rx) = mpsc::channel(1);
        state
            .sessions
            .insert(ClientSession::new(Uuid::new_v4(), tx))
            .await;
        let Json(body) = health(State(state)).await;
        assert_eq!(body.active_sessions, 1);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"status": "ok", "active_sessions": 1})
        );
    }
}
