//! Shared Application State
//!
//! `AppState` holds everything a connection handler needs: the upstream
//! connector, the tool registry, relay settings, the registry of active
//! client sessions and the tracker of connection tasks.

use crate::ws::{client_session::ClientSession, relay::RelaySettings};
use cubby_core::{ToolRegistry, UpstreamConnector};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn UpstreamConnector>,
    pub tools: Arc<ToolRegistry>,
    pub settings: RelaySettings,
    pub sessions: SessionRegistry,
    /// Upgraded WebSocket connections. axum does not wait for these on
    /// shutdown, so they are tracked here.
    pub connections: TaskTracker,
}

impl AppState {
    /// Stops accepting new connection tasks and waits up to `grace` for the
    /// running ones to finish their teardown. Returns `false` on timeout.
    pub async fn drain_connections(&self, grace: Duration) -> bool {
        self.connections.close();
        tokio::time::timeout(grace, self.connections.wait())
            .await
            .is_ok()
    }
}

/// Active client sessions, keyed by client id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<Uuid, Arc<ClientSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<ClientSession>) {
        self.inner.lock().await.insert(session.id(), session);
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<ClientSession>> {
        self.inner.lock().await.remove(&id)
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Asks every active session to stop. Each relay tears itself down.
    pub async fn stop_all(&self) -> usize {
        let sessions = self.inner.lock().await;
        for session in sessions.values() {
            session.stop();
        }
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::relay::RelaySettings;
    use async_trait::async_trait;
    use cubby_core::inactivity::InactivityPolicy;
    use cubby_core::{UpstreamError, UpstreamSession};
    use tokio::sync::mpsc;

    struct OfflineConnector;

    #[async_trait]
    impl UpstreamConnector for OfflineConnector {
        async fn connect(&self) -> Result<UpstreamSession, UpstreamError> {
            Err(UpstreamError::Connect("offline".into()))
        }
    }

    fn app_state() -> AppState {
        AppState {
            connector: Arc::new(OfflineConnector),
            tools: Arc::new(ToolRegistry::new()),
            settings: RelaySettings::new(16000, InactivityPolicy::from_secs(30, 60).unwrap()),
            sessions: SessionRegistry::new(),
            connections: TaskTracker::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_connection_teardown() {
        let state = app_state();
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        state.connections.spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            done_tx.send(()).await.unwrap();
        });

        assert!(state.drain_connections(Duration::from_secs(10)).await);
        assert_eq!(done_rx.try_recv(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_gives_up_after_grace() {
        let state = app_state();
        state.connections.spawn(std::future::pending::<()>());

        let started = tokio::time::Instant::now();
        assert!(!state.drain_connections(Duration::from_secs(5)).await);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_registry_tracks_sessions() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let a = ClientSession::new(Uuid::new_v4(), tx.clone());
        let b = ClientSession::new(Uuid::new_v4(), tx);

        registry.insert(a.clone()).await;
        registry.insert(b.clone()).await;
        assert_eq!(registry.len().await, 2);
        assert!(registry.contains(a.id()).await);

        assert_eq!(registry.stop_all().await, 2);
        assert!(a.is_stopped() && b.is_stopped());

        assert!(registry.remove(a.id()).await.is_some());
        assert!(registry.remove(a.id()).await.is_none());
        assert!(!registry.contains(a.id()).await);
        assert_eq!(registry.len().await, 1);
    }
}
