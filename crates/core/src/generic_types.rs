use bytes::Bytes;
use serde_json::{Map, Value};

/// Transcription fragment the upstream emits for non-speech input.
pub const NOISE_MARKER: &str = "<noise>";

/// Events any realtime upstream can emit back to the relay.
///
/// One upstream message may carry several of these at once; providers
/// return them in the order the relay must handle them.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// A new session resumption handle. Only usable when `resumable` is set
    /// and the handle is non-empty.
    SessionResumption {
        new_handle: Option<String>,
        resumable: bool,
    },
    /// The upstream will close the connection soon.
    GoAway { time_left: Option<String> },
    /// The user's input pre-empted the in-progress model response.
    Interrupted,
    /// The model asked for one or more tool invocations.
    ToolCall(Vec<ToolInvocation>),
    /// The model withdrew earlier tool invocations by id.
    ToolCallCancellation(Vec<String>),
    /// A chunk of model output audio (raw PCM16).
    Audio(Bytes),
    /// A text part of the model turn.
    ModelText(String),
    /// Transcription of the model's spoken output.
    OutputTranscription(String),
    /// Transcription of the user's spoken input.
    InputTranscription(String),
    /// The model finished its turn.
    TurnComplete,
}

/// Whether a transcription fragment reflects real speech rather than
/// silence or background noise.
pub fn is_meaningful_transcript(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed != NOISE_MARKER
}

/// A model-requested call of a registered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Correlation id assigned by the upstream.
    pub id: Option<String>,
    pub name: String,
    pub args: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(id: Option<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id,
            name: name.into(),
            args,
        }
    }
}

/// The single answer to a [`ToolInvocation`], keyed by the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub id: Option<String>,
    pub name: String,
    pub outcome: Result<Value, String>,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// The response mapping sent upstream. Errors become `{"error": ...}` and
    /// non-object results are wrapped under `result`.
    pub fn response(&self) -> Map<String, Value> {
        match &self.outcome {
            Ok(Value::Object(map)) => map.clone(),
            Ok(other) => {
                let mut map = Map::new();
                map.insert("result".to_string(), other.clone());
                map
            }
            Err(message) => {
                let mut map = Map::new();
                map.insert("error".to_string(), Value::String(message.clone()));
                map
            }
        }
    }
}
