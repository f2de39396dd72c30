//! The per-client session relay.
//!
//! Four activities share one [`ClientSession`]:
//!
//! - `ingest` reads client frames, stamps activity and queues audio.
//! - `forward` drains the audio queue into the upstream in FIFO order.
//! - `dispatch` drains upstream events, answers tool calls and re-emits
//!   everything else in the client protocol.
//! - `supervise` runs the inactivity state machine.
//!
//! When any of them returns, the session is stopped and the others exit
//! within one poll interval. Teardown runs once after all four are done.

use super::client_session::ClientSession;
use super::protocol::{ClientMessage, INTERRUPTED_MESSAGE, ServerMessage};
use super::supervisor::supervise;
use crate::error::RelayError;
use crate::state::SessionRegistry;
use axum::extract::ws::Message;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use cubby_core::generic_types::is_meaningful_transcript;
use cubby_core::inactivity::InactivityPolicy;
use cubby_core::realtime_api::pcm_mime_type;
use cubby_core::{ToolRegistry, UpstreamEvent, UpstreamEvents, UpstreamSink};
use futures_util::{FutureExt, Stream, StreamExt};
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{Instrument, debug, error, info, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_AUDIO_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Sample rate of inbound audio, used to tag frames sent upstream.
    pub send_sample_rate: u32,
    pub inactivity: InactivityPolicy,
    /// How often every activity re-checks `should_stop`.
    pub poll_interval: Duration,
    /// Capacity of the inbound audio queue; ingest waits when it is full.
    pub audio_queue_capacity: usize,
}

impl RelaySettings {
    pub fn new(send_sample_rate: u32, inactivity: InactivityPolicy) -> Self {
        Self {
            send_sample_rate,
            inactivity,
            poll_interval: DEFAULT_POLL_INTERVAL,
            audio_queue_capacity: DEFAULT_AUDIO_QUEUE_CAPACITY,
        }
    }
}

pub struct Relay {
    session: Arc<ClientSession>,
    sink: Arc<dyn UpstreamSink>,
    tools: Arc<ToolRegistry>,
    settings: RelaySettings,
    registry: SessionRegistry,
}

impl Relay {
    pub fn new(
        session: Arc<ClientSession>,
        sink: Arc<dyn UpstreamSink>,
        tools: Arc<ToolRegistry>,
        settings: RelaySettings,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            session,
            sink,
            tools,
            settings,
            registry,
        }
    }

    /// Runs all four activities until the session stops, then tears down.
    ///
    /// Returns the first activity failure, if any. A client that simply
    /// disconnects, an upstream that ends its stream and an inactivity
    /// termination all count as a normal end.
    pub async fn run<S, E>(
        self,
        inbound: S,
        events: Box<dyn UpstreamEvents>,
    ) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
        E: Display + Send + 'static,
    {
        let poll = self.settings.poll_interval;
        let (audio_tx, audio_rx) = mpsc::channel(self.settings.audio_queue_capacity.max(1));
        let mut tasks = JoinSet::new();

        tasks.spawn(
            guarded(
                "ingest",
                ingest(
                    self.session.clone(),
                    inbound,
                    audio_tx,
                    self.sink.clone(),
                    poll,
                ),
            )
            .in_current_span(),
        );
        tasks.spawn(
            guarded(
                "forward",
                forward(
                    self.session.clone(),
                    audio_rx,
                    self.sink.clone(),
                    pcm_mime_type(self.settings.send_sample_rate),
                    poll,
                ),
            )
            .in_current_span(),
        );
        tasks.spawn(
            guarded(
                "dispatch",
                Dispatcher::new(self.session.clone(), self.sink.clone(), self.tools.clone())
                    .run(events, poll),
            )
            .in_current_span(),
        );
        tasks.spawn(
            guarded(
                "supervise",
                supervise(
                    self.session.clone(),
                    self.sink.clone(),
                    self.settings.inactivity,
                    poll,
                ),
            )
            .in_current_span(),
        );

        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            // Whatever ended first, everyone else winds down now.
            self.session.stop();
            let (activity, result) = match joined {
                Ok(done) => done,
                Err(e) => (
                    "relay",
                    Err(RelayError::Activity {
                        activity: "relay",
                        reason: e.to_string(),
                    }),
                ),
            };
            match result {
                Ok(()) => debug!(activity, "Relay activity finished"),
                Err(e) => {
                    error!(activity, error = %e, "Relay activity failed");
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
            }
        }

        self.teardown().await;
        outcome
    }

    async fn teardown(&self) {
        if !self.session.begin_teardown() {
            return;
        }
        self.session.stop();
        self.registry.remove(self.session.id()).await;
        self.session.close_transport().await;
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Ignoring error while closing upstream");
        }
        info!("Client session torn down");
    }
}

/// Runs an activity, turning a panic into a [`RelayError::Activity`].
async fn guarded<F>(activity: &'static str, fut: F) -> (&'static str, Result<(), RelayError>)
where
    F: Future<Output = Result<(), RelayError>>,
{
    let result = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(RelayError::Activity {
            activity,
            reason: panic_message(payload.as_ref()),
        }),
    };
    (activity, result)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

async fn ingest<S, E>(
    session: Arc<ClientSession>,
    mut inbound: S,
    audio_tx: mpsc::Sender<Bytes>,
    sink: Arc<dyn UpstreamSink>,
    poll: Duration,
) -> Result<(), RelayError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while !session.is_stopped() {
        let frame = match timeout(poll, inbound.next()).await {
            Err(_) => continue,
            Ok(None) => {
                info!("Client disconnected");
                return Ok(());
            }
            Ok(Some(Err(e))) => return Err(RelayError::Transport(e.to_string())),
            Ok(Some(Ok(frame))) => frame,
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => {
                info!("Client sent close frame");
                return Ok(());
            }
            Message::Binary(_) => {
                warn!("Ignoring binary frame from client");
                continue;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let msg = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Invalid message from client");
                continue;
            }
        };

        match msg {
            ClientMessage::Audio { data } => {
                let frame = match STANDARD.decode(data.as_bytes()) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(e) => {
                        warn!(error = %e, "Invalid audio payload from client");
                        continue;
                    }
                };
                if session.claim_pending_speech().await {
                    debug!("Audio follows recognised speech, activity updated");
                }
                if audio_tx.send(frame).await.is_err() {
                    // Forwarding has stopped; so has the session.
                    return Ok(());
                }
            }
            ClientMessage::Text { data } => {
                session.touch().await;
                info!(text = %data, "Received text from client");
                if let Err(e) = sink.send_text(&data).await {
                    error!(error = %e, "Failed to send client text upstream");
                }
            }
            ClientMessage::End => info!("Received end signal from client"),
        }
    }
    Ok(())
}

async fn forward(
    session: Arc<ClientSession>,
    mut audio_rx: mpsc::Receiver<Bytes>,
    sink: Arc<dyn UpstreamSink>,
    mime_type: String,
    poll: Duration,
) -> Result<(), RelayError> {
    while !session.is_stopped() {
        let frame = match timeout(poll, audio_rx.recv()).await {
            Err(_) => continue,
            Ok(None) => return Ok(()),
            Ok(Some(frame)) => frame,
        };
        if let Err(e) = sink.send_media(frame, &mime_type).await {
            error!(error = %e, "Failed to forward audio upstream");
        }
    }
    Ok(())
}

/// Transcript fragments of the current turn, logged when it completes.
#[derive(Debug, Default)]
struct TurnTranscript {
    input: Vec<String>,
    output: Vec<String>,
}

impl TurnTranscript {
    fn flush(&mut self) {
        if !self.input.is_empty() {
            info!(transcript = %self.input.concat(), "User said");
        }
        if !self.output.is_empty() {
            info!(transcript = %self.output.concat(), "Model said");
        }
        self.input.clear();
        self.output.clear();
    }
}

struct Dispatcher {
    session: Arc<ClientSession>,
    sink: Arc<dyn UpstreamSink>,
    tools: Arc<ToolRegistry>,
    transcript: TurnTranscript,
}

impl Dispatcher {
    fn new(
        session: Arc<ClientSession>,
        sink: Arc<dyn UpstreamSink>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            session,
            sink,
            tools,
            transcript: TurnTranscript::default(),
        }
    }

    async fn run(
        mut self,
        mut events: Box<dyn UpstreamEvents>,
        poll: Duration,
    ) -> Result<(), RelayError> {
        while !self.session.is_stopped() {
            let batch = match timeout(poll, events.next_events()).await {
                Err(_) => continue,
                Ok(None) => {
                    info!("Upstream event stream ended");
                    return Ok(());
                }
                Ok(Some(Err(e))) => return Err(RelayError::Upstream(e)),
                Ok(Some(Ok(batch))) => batch,
            };
            for event in batch {
                self.handle(event).await;
            }
        }
        Ok(())
    }

    async fn handle(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::SessionResumption {
                new_handle: Some(handle),
                resumable: true,
            } if !handle.is_empty() => {
                info!(handle = %handle, "New session resumption handle");
                self.session
                    .send(ServerMessage::SessionId { data: handle })
                    .await;
            }
            UpstreamEvent::SessionResumption { resumable, .. } => {
                debug!(resumable, "Session resumption update without a usable handle");
            }
            UpstreamEvent::GoAway { time_left } => {
                info!(time_left = ?time_left, "Upstream will terminate the session soon");
            }
            UpstreamEvent::Interrupted => {
                info!("Model response interrupted");
                self.session
                    .send(ServerMessage::Interrupted {
                        data: INTERRUPTED_MESSAGE.to_string(),
                    })
                    .await;
            }
            UpstreamEvent::ToolCall(invocations) => {
                for invocation in invocations {
                    let result = self.tools.invoke(invocation);
                    if let Err(e) = self.sink.send_function_result(&result).await {
                        error!(tool = %result.name, error = %e, "Failed to send function response");
                    }
                }
            }
            UpstreamEvent::ToolCallCancellation(ids) => {
                info!(ids = ?ids, "Upstream cancelled tool calls");
            }
            UpstreamEvent::Audio(data) => {
                self.session
                    .send(ServerMessage::Audio {
                        data: STANDARD.encode(&data),
                    })
                    .await;
            }
            UpstreamEvent::ModelText(text) => {
                debug!(text = %text, "Model text part");
            }
            UpstreamEvent::InputTranscription(text) => {
                if is_meaningful_transcript(&text) {
                    self.session.mark_speech().await;
                    self.transcript.input.push(text);
                }
            }
            UpstreamEvent::OutputTranscription(text) => {
                if is_meaningful_transcript(&text) {
                    self.session.touch().await;
                    self.transcript.output.push(text.clone());
                    self.session.send(ServerMessage::Text { data: text }).await;
                }
            }
            UpstreamEvent::TurnComplete => {
                info!("Model turn complete");
                self.session.send(ServerMessage::TurnComplete).await;
                self.transcript.flush();
            }
        }
    }
}
