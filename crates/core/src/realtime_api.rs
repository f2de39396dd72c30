//! The send/receive contract of a realtime upstream session.
//!
//! The relay only talks to the conversational backend through these traits,
//! so a concrete provider (see the `gemini-live` crate) or an in-process fake
//! can stand behind them.

use crate::generic_types::{ToolResult, UpstreamEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Errors raised while talking to the upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Failed to connect upstream: {0}")]
    Connect(String),
    #[error("Failed to send upstream: {0}")]
    Send(String),
    #[error("Failed to receive from upstream: {0}")]
    Receive(String),
    #[error("Upstream protocol error: {0}")]
    Protocol(String),
    #[error("Upstream connection closed")]
    Closed,
}

/// Builds the media type for raw PCM16 audio at a given sample rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// The sending half of an upstream session.
///
/// Implementations must tolerate concurrent calls from several activities.
#[async_trait]
pub trait UpstreamSink: Send + Sync {
    /// Streams a realtime media chunk (e.g. PCM audio) upstream.
    async fn send_media(&self, data: Bytes, mime_type: &str) -> Result<(), UpstreamError>;

    /// Sends a complete user text turn. The text is forwarded verbatim.
    async fn send_text(&self, text: &str) -> Result<(), UpstreamError>;

    /// Answers a tool invocation.
    async fn send_function_result(&self, result: &ToolResult) -> Result<(), UpstreamError>;

    /// Closes the upstream connection.
    async fn close(&self) -> Result<(), UpstreamError>;
}

/// The receiving half of an upstream session.
#[async_trait]
pub trait UpstreamEvents: Send {
    /// Waits for the next upstream message and returns its events in handling
    /// order. Returns `None` once the stream has ended.
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses no
    /// events.
    async fn next_events(&mut self) -> Option<Result<Vec<UpstreamEvent>, UpstreamError>>;
}

/// A connected upstream session, split into its two halves.
pub struct UpstreamSession {
    pub sink: Arc<dyn UpstreamSink>,
    pub events: Box<dyn UpstreamEvents>,
}

/// Opens new upstream sessions, one per client connection.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> Result<UpstreamSession, UpstreamError>;
}
