//! The live WebSocket session to Gemini, split into a shared sender and an
//! event receiver.

use crate::config::LiveConfig;
use crate::types::{
    AudioTranscriptionConfig, Blob, ClientContent, ClientMessage, Content, FunctionDeclaration,
    FunctionResponse, GenerationConfig, PrebuiltVoiceConfig, RealtimeInput, ResponseModality,
    ServerMessage, SessionResumptionConfig, Setup, SpeechConfig, Tool, ToolResponse, VoiceConfig,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use cubby_core::{
    ToolResult, UpstreamConnector, UpstreamError, UpstreamEvent, UpstreamEvents, UpstreamSession,
    UpstreamSink,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message as WsMessage,
    },
};
use tracing::{debug, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SETUP_TIMEOUT: Duration = Duration::from_secs(30);

static CRYPTO_PROVIDER: Once = Once::new();

fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Another component may have installed one already; either is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Opens one Gemini Live session per call.
pub struct GeminiLiveConnector {
    config: Arc<LiveConfig>,
}

impl GeminiLiveConnector {
    pub fn new(config: LiveConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }
}

#[async_trait]
impl UpstreamConnector for GeminiLiveConnector {
    async fn connect(&self) -> Result<UpstreamSession, UpstreamError> {
        let (sink, events) = connect(&self.config).await?;
        Ok(UpstreamSession {
            sink: Arc::new(sink),
            events: Box::new(events),
        })
    }
}

/// Builds the `setup` message that opens every session.
pub fn setup_message(config: &LiveConfig) -> ClientMessage {
    let function_declarations: Vec<FunctionDeclaration> =
        config.tools.iter().cloned().map(Into::into).collect();
    let tools = if function_declarations.is_empty() {
        vec![]
    } else {
        vec![Tool {
            function_declarations,
        }]
    };

    ClientMessage::Setup(Setup {
        model: config.model_path(),
        generation_config: GenerationConfig {
            response_modalities: vec![ResponseModality::Audio],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: config.voice_name.clone(),
                    },
                },
            },
        },
        system_instruction: (!config.system_instruction.is_empty())
            .then(|| Content::text(None, config.system_instruction.clone())),
        tools,
        input_audio_transcription: AudioTranscriptionConfig::default(),
        output_audio_transcription: AudioTranscriptionConfig::default(),
        session_resumption: SessionResumptionConfig::default(),
    })
}

/// Connects, performs the setup handshake and returns the two halves.
#[instrument(skip_all, fields(model = %config.model))]
pub async fn connect(config: &LiveConfig) -> Result<(GeminiSender, GeminiReceiver), UpstreamError> {
    install_crypto_provider();

    let mut request = config
        .url()
        .into_client_request()
        .map_err(|e| UpstreamError::Connect(e.to_string()))?;
    if let Some(token) = config.bearer_token() {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (ws_stream, _) = connect_async(request)
        .await
        .map_err(|e| UpstreamError::Connect(e.to_string()))?;
    info!("Connected to Gemini Live WebSocket.");
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let setup = serde_json::to_string(&setup_message(config))
        .map_err(|e| UpstreamError::Protocol(e.to_string()))?;
    ws_tx
        .send(WsMessage::Text(setup.into()))
        .await
        .map_err(|e| UpstreamError::Send(e.to_string()))?;

    tokio::time::timeout(SETUP_TIMEOUT, wait_for_setup_complete(&mut ws_rx))
        .await
        .map_err(|_| UpstreamError::Connect("timed out waiting for setupComplete".into()))??;
    info!("Gemini session setup is complete.");

    Ok((
        GeminiSender {
            tx: Arc::new(Mutex::new(ws_tx)),
        },
        GeminiReceiver { rx: ws_rx },
    ))
}

async fn wait_for_setup_complete(rx: &mut SplitStream<WsStream>) -> Result<(), UpstreamError> {
    while let Some(frame) = rx.next().await {
        let frame = frame.map_err(|e| UpstreamError::Receive(e.to_string()))?;
        match decode_frame(frame)? {
            Frame::Message(msg) if msg.setup_complete.is_some() => return Ok(()),
            Frame::Message(msg) => warn!(?msg, "Unexpected message during Gemini setup"),
            Frame::Closed(reason) => {
                return Err(UpstreamError::Connect(format!(
                    "closed during setup: {}",
                    reason
                )));
            }
            Frame::Skip => {}
        }
    }
    Err(UpstreamError::Closed)
}

enum Frame {
    Message(Box<ServerMessage>),
    Closed(String),
    Skip,
}

/// Both text and binary frames carry JSON server messages.
fn decode_frame(frame: WsMessage) -> Result<Frame, UpstreamError> {
    let parsed = match frame {
        WsMessage::Text(text) => serde_json::from_str::<ServerMessage>(text.as_str()),
        WsMessage::Binary(data) => serde_json::from_slice::<ServerMessage>(&data),
        WsMessage::Close(close_frame) => {
            let reason = close_frame
                .map(|f| format!("{} {}", f.code, f.reason))
                .unwrap_or_else(|| "no close frame".to_string());
            return Ok(Frame::Closed(reason));
        }
        _ => return Ok(Frame::Skip),
    };
    parsed
        .map(|msg| Frame::Message(Box::new(msg)))
        .map_err(|e| UpstreamError::Protocol(e.to_string()))
}

/// The sending half. Cheap to share; sends are serialized behind a mutex.
#[derive(Clone)]
pub struct GeminiSender {
    tx: Arc<Mutex<SplitSink<WsStream, WsMessage>>>,
}

impl GeminiSender {
    async fn send(&self, msg: &ClientMessage) -> Result<(), UpstreamError> {
        let payload =
            serde_json::to_string(msg).map_err(|e| UpstreamError::Protocol(e.to_string()))?;
        self.tx
            .lock()
            .await
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| UpstreamError::Send(e.to_string()))
    }
}

#[async_trait]
impl UpstreamSink for GeminiSender {
    async fn send_media(&self, data: Bytes, mime_type: &str) -> Result<(), UpstreamError> {
        self.send(&ClientMessage::RealtimeInput(RealtimeInput {
            audio: Blob {
                mime_type: mime_type.to_string(),
                data: STANDARD.encode(&data),
            },
        }))
        .await
    }

    async fn send_text(&self, text: &str) -> Result<(), UpstreamError> {
        self.send(&ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::text(Some("user"), text)],
            turn_complete: true,
        }))
        .await
    }

    async fn send_function_result(&self, result: &ToolResult) -> Result<(), UpstreamError> {
        self.send(&ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: result.id.clone(),
                name: result.name.clone(),
                response: result.response(),
            }],
        }))
        .await
    }

    async fn close(&self) -> Result<(), UpstreamError> {
        self.tx
            .lock()
            .await
            .close()
            .await
            .map_err(|e| UpstreamError::Send(e.to_string()))
    }
}

/// The receiving half.
pub struct GeminiReceiver {
    rx: SplitStream<WsStream>,
}

#[async_trait]
impl UpstreamEvents for GeminiReceiver {
    async fn next_events(&mut self) -> Option<Result<Vec<UpstreamEvent>, UpstreamError>> {
        loop {
            let frame = match self.rx.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(UpstreamError::Receive(e.to_string()))),
            };
            match decode_frame(frame) {
                Ok(Frame::Message(msg)) => {
                    let events = msg.into_events();
                    if events.is_empty() {
                        continue;
                    }
                    return Some(Ok(events));
                }
                Ok(Frame::Closed(reason)) => {
                    info!(%reason, "Gemini WebSocket connection closed by server.");
                    return None;
                }
                Ok(Frame::Skip) => {}
                Err(e) => {
                    // One unparsable message is not fatal for the session.
                    debug!(error = %e, "Skipping unparsable Gemini message");
                }
            }
        }
    }
}
