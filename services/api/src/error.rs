use cubby_core::UpstreamError;

/// Why a relay ended abnormally.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The client connection failed. Peer-side; nothing to retry.
    #[error("Client transport error: {0}")]
    Transport(String),
    /// The upstream session failed while draining events.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// A relay activity panicked or was cancelled.
    #[error("Relay activity '{activity}' failed: {reason}")]
    Activity {
        activity: &'static str,
        reason: String,
    },
}

impl RelayError {
    /// Errors caused by the server side rather than by the client going away.
    pub fn is_server_fault(&self) -> bool {
        !matches!(self, RelayError::Transport(_))
    }
}
