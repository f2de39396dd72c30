//! Wire types of the Gemini Live `BidiGenerateContent` protocol.
//!
//! Only the fields the relay reads or writes are modelled; unknown fields in
//! server messages are ignored by serde.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use cubby_core::{ToolDeclaration, ToolInvocation, UpstreamEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

// --- Client → server ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
    ToolResponse(ToolResponse),
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    pub input_audio_transcription: AudioTranscriptionConfig,
    pub output_audio_transcription: AudioTranscriptionConfig,
    pub session_resumption: SessionResumptionConfig,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    pub speech_config: SpeechConfig,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Empty object; its presence turns transcription on.
#[derive(Serialize, Debug, Default)]
pub struct AudioTranscriptionConfig {}

#[derive(Serialize, Debug, Default)]
pub struct SessionResumptionConfig {
    /// `null` starts a fresh session that still emits resumption updates.
    pub handle: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters_json_schema: Value,
}

impl From<ToolDeclaration> for FunctionDeclaration {
    fn from(declaration: ToolDeclaration) -> Self {
        Self {
            name: declaration.name,
            description: declaration.description,
            parameters_json_schema: declaration.parameters,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Serialize, Debug)]
pub struct Part {
    pub text: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub audio: Blob,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Serialize, Debug)]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Map<String, Value>,
}

// --- Server → client ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<Value>,
    pub server_content: Option<ServerContent>,
    pub tool_call: Option<ToolCall>,
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    pub go_away: Option<GoAway>,
    pub session_resumption_update: Option<SessionResumptionUpdate>,
    pub usage_metadata: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub generation_complete: bool,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<ServerBlob>,
    pub function_call: Option<FunctionCall>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlob {
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Deserialize, Debug)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Deserialize, Debug)]
pub struct FunctionCall {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Option<Map<String, Value>>,
}

impl From<FunctionCall> for ToolInvocation {
    fn from(call: FunctionCall) -> Self {
        ToolInvocation::new(call.id, call.name, call.args.unwrap_or_default())
    }
}

#[derive(Deserialize, Debug)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    pub time_left: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionResumptionUpdate {
    pub new_handle: Option<String>,
    #[serde(default)]
    pub resumable: bool,
}

impl ServerMessage {
    /// Flattens one server message into relay events, in handling order:
    /// resumption, go-away, interruption, tool calls, output media and text,
    /// transcriptions, then turn completion.
    pub fn into_events(self) -> Vec<UpstreamEvent> {
        let mut events = Vec::new();

        if let Some(update) = self.session_resumption_update {
            events.push(UpstreamEvent::SessionResumption {
                new_handle: update.new_handle,
                resumable: update.resumable,
            });
        }
        if let Some(go_away) = self.go_away {
            events.push(UpstreamEvent::GoAway {
                time_left: go_away.time_left,
            });
        }
        if let Some(cancellation) = self.tool_call_cancellation {
            events.push(UpstreamEvent::ToolCallCancellation(cancellation.ids));
        }

        let content = self.server_content.unwrap_or_default();
        if content.interrupted {
            events.push(UpstreamEvent::Interrupted);
        }

        let parts = content.model_turn.map(|turn| turn.parts).unwrap_or_default();
        let mut invocations: Vec<ToolInvocation> = self
            .tool_call
            .map(|call| call.function_calls.into_iter().map(Into::into).collect())
            .unwrap_or_default();
        let mut media = Vec::new();
        for part in parts {
            if let Some(call) = part.function_call {
                invocations.push(call.into());
            }
            if let Some(blob) = part.inline_data {
                match STANDARD.decode(blob.data.as_bytes()) {
                    Ok(data) => media.push(UpstreamEvent::Audio(Bytes::from(data))),
                    Err(e) => warn!(
                        error = %e,
                        mime_type = ?blob.mime_type,
                        "Dropping undecodable inline data"
                    ),
                }
            }
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                media.push(UpstreamEvent::ModelText(text));
            }
        }
        if !invocations.is_empty() {
            events.push(UpstreamEvent::ToolCall(invocations));
        }
        events.extend(media);

        if let Some(t) = content.input_transcription.filter(|t| !t.text.is_empty()) {
            events.push(UpstreamEvent::InputTranscription(t.text));
        }
        if let Some(t) = content.output_transcription.filter(|t| !t.text.is_empty()) {
            events.push(UpstreamEvent::OutputTranscription(t.text));
        }
        if content.turn_complete {
            events.push(UpstreamEvent::TurnComplete);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> ServerMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_setup_serializes_camel_case() {
        let setup = ClientMessage::Setup(Setup {
            model: "models/gemini-live".into(),
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: "Puck".into(),
                        },
                    },
                },
            },
            system_instruction: Some(Content::text(None, "Be helpful")),
            tools: vec![Tool {
                function_declarations: vec![FunctionDeclaration {
                    name: "get_order_status".into(),
                    description: "Look up an order".into(),
                    parameters_json_schema: json!({"type": "object"}),
                }],
            }],
            input_audio_transcription: AudioTranscriptionConfig::default(),
            output_audio_transcription: AudioTranscriptionConfig::default(),
            session_resumption: SessionResumptionConfig::default(),
        });

        let value = serde_json::to_value(&setup).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/gemini-live",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Puck"}}
                        }
                    },
                    "systemInstruction": {"parts": [{"text": "Be helpful"}]},
                    "tools": [{
                        "functionDeclarations": [{
                            "name": "get_order_status",
                            "description": "Look up an order",
                            "parametersJsonSchema": {"type": "object"}
                        }]
                    }],
                    "inputAudioTranscription": {},
                    "outputAudioTranscription": {},
                    "sessionResumption": {"handle": null}
                }
            })
        );
    }

    #[test]
    fn test_tool_response_serialization() {
        let mut response = Map::new();
        response.insert("status".into(), json!("shipped"));
        let msg = ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: Some("call-1".into()),
                name: "get_order_status".into(),
                response,
            }],
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"toolResponse": {"functionResponses": [
                {"id": "call-1", "name": "get_order_status", "response": {"status": "shipped"}}
            ]}})
        );
    }

    #[test]
    fn test_setup_complete_has_no_events() {
        let msg = parse(json!({"setupComplete": {}}));
        assert!(msg.setup_complete.is_some());
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn test_model_turn_audio_and_turn_complete() {
        let msg = parse(json!({
            "serverContent": {
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAEC"}}
                ]},
                "outputTranscription": {"text": "Hi there"},
                "turnComplete": true
            }
        }));
        assert_eq!(
            msg.into_events(),
            vec![
                UpstreamEvent::Audio(Bytes::from_static(&[0, 1, 2])),
                UpstreamEvent::OutputTranscription("Hi there".into()),
                UpstreamEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_control_events_come_first() {
        let msg = parse(json!({
            "sessionResumptionUpdate": {"newHandle": "handle-1", "resumable": true},
            "goAway": {"timeLeft": "10s"},
            "serverContent": {
                "interrupted": true,
                "inputTranscription": {"text": "hello"}
            }
        }));
        assert_eq!(
            msg.into_events(),
            vec![
                UpstreamEvent::SessionResumption {
                    new_handle: Some("handle-1".into()),
                    resumable: true
                },
                UpstreamEvent::GoAway {
                    time_left: Some("10s".into())
                },
                UpstreamEvent::Interrupted,
                UpstreamEvent::InputTranscription("hello".into()),
            ]
        );
    }

    #[test]
    fn test_function_calls_from_tool_call_and_parts() {
        let msg = parse(json!({
            "toolCall": {"functionCalls": [
                {"id": "a", "name": "get_order_status", "args": {"order_id": "SH1005"}}
            ]},
            "serverContent": {"modelTurn": {"parts": [
                {"functionCall": {"id": "b", "name": "check_storage_availability"}}
            ]}}
        }));
        let events = msg.into_events();
        assert_eq!(events.len(), 1);
        let UpstreamEvent::ToolCall(calls) = &events[0] else {
            panic!("expected a tool call, got {:?}", events[0]);
        };
        assert_eq!(calls[0].id.as_deref(), Some("a"));
        assert_eq!(calls[0].args["order_id"], "SH1005");
        assert_eq!(calls[1].id.as_deref(), Some("b"));
        assert_eq!(calls[1].name, "check_storage_availability");
        assert!(calls[1].args.is_empty());
    }

    #[test]
    fn test_cancellation_and_unknown_fields() {
        let msg = parse(json!({
            "toolCallCancellation": {"ids": ["a", "b"]},
            "usageMetadata": {"totalTokenCount": 12},
            "somethingNew": true
        }));
        assert_eq!(
            msg.into_events(),
            vec![UpstreamEvent::ToolCallCancellation(vec!["a".into(), "b".into()])]
        );
    }

    #[test]
    fn test_empty_transcriptions_are_skipped() {
        let msg = parse(json!({
            "serverContent": {"inputTranscription": {}, "outputTranscription": {"text": ""}}
        }));
        assert!(msg.into_events().is_empty());
    }
}
