//! The inactivity-check activity of a relay.

use super::client_session::ClientSession;
use super::protocol::ServerMessage;
use crate::error::RelayError;
use cubby_core::UpstreamSink;
use cubby_core::inactivity::{
    InactivityAction, InactivityMonitor, InactivityPolicy, TERMINATE_PROMPT, TIMEOUT_MESSAGE,
    WARN_PROMPT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Evaluates the session's idle time every `tick` and escalates
/// warn → terminate. Returns once the session stops or is terminated.
pub(crate) async fn supervise(
    session: Arc<ClientSession>,
    sink: Arc<dyn UpstreamSink>,
    policy: InactivityPolicy,
    tick: Duration,
) -> Result<(), RelayError> {
    let mut monitor = InactivityMonitor::new(policy);
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if session.is_stopped() {
            return Ok(());
        }

        let idle = session.idle_for().await;
        match monitor.evaluate(idle) {
            InactivityAction::None => {}
            InactivityAction::Warn => {
                warn!(idle_secs = idle.as_secs(), "Client inactive, checking in");
                if let Err(e) = sink.send_text(WARN_PROMPT).await {
                    error!(error = %e, "Failed to send inactivity check-in prompt");
                }
            }
            InactivityAction::Terminate => {
                warn!(
                    idle_secs = idle.as_secs(),
                    "Client inactive for too long, ending session"
                );
                if let Err(e) = sink.send_text(TERMINATE_PROMPT).await {
                    error!(error = %e, "Failed to send inactivity goodbye prompt");
                }
                let timeout_msg = ServerMessage::Timeout {
                    data: TIMEOUT_MESSAGE.to_string(),
                };
                // A client that stopped reading must not keep the session alive.
                let delivered = tokio::time::timeout(tick, session.send(timeout_msg)).await;
                if !matches!(delivered, Ok(true)) {
                    warn!("Could not deliver the timeout message to the client");
                }
                session.stop();
                info!("Session terminated for inactivity");
                return Ok(());
            }
        }
    }
}
