//! Per-connection state shared by the relay activities.

use super::protocol::ServerMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Activity {
    /// `None` until the first qualifying activity.
    last_activity: Option<Instant>,
    /// An input transcription recognised speech that no audio chunk has
    /// claimed yet.
    pending_speech: bool,
}

/// One connected client. Exactly one per physical connection.
///
/// `last_activity` and `pending_speech` are written by both ingest and
/// dispatch, so they live behind one mutex. `should_stop` is the single
/// cancellation signal every activity polls.
#[derive(Debug)]
pub struct ClientSession {
    id: Uuid,
    created_at: Instant,
    activity: Mutex<Activity>,
    should_stop: AtomicBool,
    stopped: Notify,
    torn_down: AtomicBool,
    outbound: Mutex<Option<mpsc::Sender<ServerMessage>>>,
}

impl ClientSession {
    pub fn new(id: Uuid, outbound: mpsc::Sender<ServerMessage>) -> Arc<Self> {
        Arc::new(Self {
            id,
            created_at: Instant::now(),
            activity: Mutex::new(Activity::default()),
            should_stop: AtomicBool::new(false),
            stopped: Notify::new(),
            torn_down: AtomicBool::new(false),
            outbound: Mutex::new(Some(outbound)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Records meaningful user activity now.
    pub async fn touch(&self) {
        self.activity.lock().await.last_activity = Some(Instant::now());
    }

    /// Records recognised user speech: stamps activity and arms the
    /// pending-speech flag for the next audio chunk.
    pub async fn mark_speech(&self) {
        let mut activity = self.activity.lock().await;
        activity.pending_speech = true;
        activity.last_activity = Some(Instant::now());
    }

    /// Called for every inbound audio chunk. If speech is pending, stamps
    /// activity, clears the flag and returns `true`.
    pub async fn claim_pending_speech(&self) -> bool {
        let mut activity = self.activity.lock().await;
        if !activity.pending_speech {
            return false;
        }
        activity.pending_speech = false;
        activity.last_activity = Some(Instant::now());
        true
    }

    pub async fn has_pending_speech(&self) -> bool {
        self.activity.lock().await.pending_speech
    }

    pub async fn last_activity(&self) -> Option<Instant> {
        self.activity.lock().await.last_activity
    }

    /// Idle time since the last activity, or since the session was created if
    /// there has been none.
    pub async fn idle_for(&self) -> Duration {
        let since = self
            .activity
            .lock()
            .await
            .last_activity
            .unwrap_or(self.created_at);
        since.elapsed()
    }

    pub fn stop(&self) {
        if !self.should_stop.swap(true, Ordering::SeqCst) {
            debug!(client_id = %self.id, "Session asked to stop");
        }
        self.stopped.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    /// Queues a message for the client. Returns `false` if it was dropped
    /// because the session is stopping or the transport is gone.
    ///
    /// Waits while the outbound queue is full, but gives up as soon as the
    /// session stops, so a client that stopped reading cannot stall a caller.
    pub async fn send(&self, msg: ServerMessage) -> bool {
        let Some(tx) = self.outbound.lock().await.clone() else {
            return false;
        };

        let stopped = self.stopped.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();
        if self.is_stopped() {
            debug!(?msg, "Dropping outbound message for stopped session");
            return false;
        }

        let permit = tokio::select! {
            permit = tx.reserve() => permit,
            _ = &mut stopped => {
                debug!(?msg, "Session stopped while the outbound queue was full");
                return false;
            }
        };
        match permit {
            Ok(permit) if !self.is_stopped() => {
                permit.send(msg);
                true
            }
            _ => false,
        }
    }

    /// Releases the outbound channel; the writer then closes the socket.
    pub async fn close_transport(&self) {
        self.outbound.lock().await.take();
    }

    /// Returns `true` for exactly one caller over the session's lifetime.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }
}
