//! Defines the WebSocket message protocol between the client and the relay.

use serde::{Deserialize, Serialize};

/// Messages sent from the client to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A chunk of base64-encoded PCM16 audio at the inbound sample rate.
    Audio {
        #[serde(default)]
        data: String,
    },
    /// A text turn from the user.
    Text {
        #[serde(default)]
        data: String,
    },
    /// The client finished sending audio for this turn. Informational.
    End,
}

/// Messages sent from the server to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, right after the connection is accepted.
    Ready,
    /// A chunk of base64-encoded PCM16 model audio at the outbound sample rate.
    Audio { data: String },
    /// A live fragment of the model's output transcription.
    Text { data: String },
    TurnComplete,
    Interrupted { data: String },
    /// Upstream session resumption handle, relayed verbatim.
    SessionId { data: String },
    /// The session is being closed for inactivity.
    Timeout { data: String },
}

pub const INTERRUPTED_MESSAGE: &str = "Response interrupted by user input";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_messages_parse() {
        let audio: ClientMessage =
            serde_json::from_value(json!({"type": "audio", "data": "AAEC"})).unwrap();
        assert_eq!(
            audio,
            ClientMessage::Audio {
                data: "AAEC".into()
            }
        );

        let text: ClientMessage =
            serde_json::from_value(json!({"type": "text", "data": "hello"})).unwrap();
        assert_eq!(
            text,
            ClientMessage::Text {
                data: "hello".into()
            }
        );

        let end: ClientMessage = serde_json::from_value(json!({"type": "end"})).unwrap();
        assert_eq!(end, ClientMessage::End);
    }

    #[test]
    fn test_malformed_client_messages_are_rejected() {
        for raw in [
            r#"{"type": "video", "data": "x"}"#,
            r#"{"data": "no type"}"#,
            r#"{"type": "text", "data": 5}"#,
            "not json",
        ] {
            assert!(serde_json::from_str::<ClientMessage>(raw).is_err(), "{}", raw);
        }
    }

    #[test]
    fn test_server_message_envelopes() {
        let cases = [
            (ServerMessage::Ready, json!({"type": "ready"})),
            (
                ServerMessage::Audio { data: "AAEC".into() },
                json!({"type": "audio", "data": "AAEC"}),
            ),
            (
                ServerMessage::Text { data: "Hi".into() },
                json!({"type": "text", "data": "Hi"}),
            ),
            (ServerMessage::TurnComplete, json!({"type": "turn_complete"})),
            (
                ServerMessage::Interrupted {
                    data: INTERRUPTED_MESSAGE.into(),
                },
                json!({"type": "interrupted", "data": "Response interrupted by user input"}),
            ),
            (
                ServerMessage::SessionId { data: "h-1".into() },
                json!({"type": "session_id", "data": "h-1"}),
            ),
            (
                ServerMessage::Timeout { data: "bye".into() },
                json!({"type": "timeout", "data": "bye"}),
            ),
        ];
        for (message, expected) in cases {
            assert_eq!(serde_json::to_value(&message).unwrap(), expected);
        }
    }
}
